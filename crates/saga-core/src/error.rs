use thiserror::Error;

use crate::compensation::CompensationHandle;

/// Error from constructing an invalid [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("retry policy needs at least one attempt")]
    ZeroAttempts,
}

/// Every attempt of a retried operation failed.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("gave up after {attempts} attempt(s)")]
pub struct RetryExhausted<E> {
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// True when the policy deadline stopped retrying before `max_attempts`.
    pub deadline_exceeded: bool,
    /// The failure observed on the last attempt.
    #[source]
    pub last_error: E,
}

impl<E> RetryExhausted<E> {
    /// Consume the exhaustion report and return the last observed failure.
    pub fn into_last_error(self) -> E {
        self.last_error
    }
}

/// Error from a compensation that could not be carried out.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompensationError<E> {
    /// The compensation failed on every attempt of its retry budget.
    #[error("compensation for step '{step}' ({description}) gave up after {attempts} attempt(s)")]
    Exhausted {
        /// Name of the step whose compensation failed.
        step: String,
        /// Description of what the compensation was trying to do.
        description: String,
        /// Number of compensation attempts made.
        attempts: u32,
        /// The failure observed on the last attempt.
        #[source]
        source: E,
    },

    /// The compensation task panicked or was cancelled before finishing.
    #[error("compensation task for step '{step}' ({description}) ended abnormally: {reason}")]
    Aborted {
        /// Name of the step whose compensation was lost.
        step: String,
        /// Description of what the compensation was trying to do.
        description: String,
        /// Why the task ended.
        reason: String,
    },
}

impl<E> CompensationError<E> {
    #[must_use]
    pub fn step(&self) -> &str {
        match self {
            Self::Exhausted { step, .. } | Self::Aborted { step, .. } => step,
        }
    }
}

/// Terminal failure of a saga run.
///
/// Reports the index of the step whose forward call exhausted its retries
/// together with the last failure it observed. Compensation of the steps that
/// completed before it has already been dispatched when this error is
/// returned; `compensations` tracks those tasks and never changes this error.
#[derive(Debug, Error)]
#[error("step {step_index} ('{service_id}.{operation}') failed after {attempts} attempt(s)")]
pub struct SagaError<E> {
    /// Zero-based index of the failed step.
    pub step_index: usize,
    /// Service the failed step targeted.
    pub service_id: String,
    /// Operation the failed step invoked.
    pub operation: String,
    /// Number of forward attempts made for the failed step.
    pub attempts: u32,
    /// True when the retry deadline cut the attempts short.
    pub deadline_exceeded: bool,
    /// The failure observed on the last forward attempt.
    #[source]
    pub source: E,
    /// Handle on the compensations dispatched for the completed steps.
    pub compensations: CompensationHandle<E>,
}

impl<E> SagaError<E> {
    /// Detach the compensation handle, leaving the tasks running.
    pub fn into_compensations(self) -> CompensationHandle<E> {
        self.compensations
    }
}
