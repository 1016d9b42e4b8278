use crate::orchestrator::SagaOrchestrator;
use crate::retry::RetryPolicy;

/// Builder for a [`SagaOrchestrator`] with non-default retry policies.
///
/// Forward calls and compensations are configured independently; both
/// default to [`RetryPolicy::default`].
///
/// ```
/// use std::time::Duration;
///
/// use saga_core::{RetryPolicy, SagaOrchestrator};
///
/// # fn main() -> Result<(), saga_core::PolicyError> {
/// let forward = RetryPolicy::new(5, Duration::from_millis(20))?
///     .with_deadline(Duration::from_secs(2));
///
/// let orchestrator = SagaOrchestrator::builder(())
///     .retry_policy(forward)
///     .build();
///
/// assert_eq!(orchestrator.retry_policy().max_attempts(), 5);
/// assert_eq!(orchestrator.compensation_policy().max_attempts(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OrchestratorBuilder<C> {
    client: C,
    retry_policy: RetryPolicy,
    compensation_policy: RetryPolicy,
}

impl<C> OrchestratorBuilder<C> {
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            retry_policy: RetryPolicy::default(),
            compensation_policy: RetryPolicy::default(),
        }
    }

    /// Policy applied to every forward call.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Policy applied to every compensation.
    #[must_use]
    pub fn compensation_policy(mut self, policy: RetryPolicy) -> Self {
        self.compensation_policy = policy;
        self
    }

    #[must_use]
    pub fn build(self) -> SagaOrchestrator<C> {
        SagaOrchestrator::from_parts(self.client, self.retry_policy, self.compensation_policy)
    }
}
