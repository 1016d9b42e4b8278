use std::future::Future;

use tracing::{debug, info, warn};

use crate::audit::SagaAuditLog;
use crate::builder::OrchestratorBuilder;
use crate::compensation::{CompensationCoordinator, CompensationHandle};
use crate::error::{RetryExhausted, SagaError};
use crate::retry::{Retried, RetryPolicy, execute_with_retry};
use crate::step::Step;

/// Remote collaborator that performs a step's forward side effect.
///
/// The orchestrator only looks at whether a call succeeded. A collaborator
/// should fail fast; the retry budget is the only timeout the orchestrator
/// applies.
pub trait ServiceClient<P>: Send + Sync {
    /// Failure reported by a forward call. Compensations of steps run by this
    /// client report the same type.
    type Error: Send + 'static;

    /// Invoke `operation` on `service_id` with `payload`.
    fn call(
        &self,
        service_id: &str,
        operation: &str,
        payload: &P,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Position of a saga run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    /// Attempting the step at this index.
    Running(usize),
    /// Every step succeeded.
    Completed,
    /// The step at this index exhausted its retries.
    Failed(usize),
}

impl SagaState {
    pub(crate) fn initial(step_count: usize) -> Self {
        if step_count == 0 {
            Self::Completed
        } else {
            Self::Running(0)
        }
    }

    pub(crate) fn on_step_succeeded(self, step_count: usize) -> Self {
        match self {
            Self::Running(index) if index + 1 < step_count => Self::Running(index + 1),
            Self::Running(_) => Self::Completed,
            terminal => terminal,
        }
    }

    pub(crate) fn on_step_exhausted(self) -> Self {
        match self {
            Self::Running(index) => Self::Failed(index),
            terminal => terminal,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running(_))
    }
}

/// Steps whose forward call succeeded during the current run, in order.
///
/// Owned by a single run and handed to the compensation coordinator whole.
struct ExecutionRecord<P, E> {
    completed: Vec<Step<P, E>>,
}

impl<P, E> ExecutionRecord<P, E> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
        }
    }

    fn push(&mut self, step: Step<P, E>) {
        self.completed.push(step);
    }

    fn into_steps(self) -> Vec<Step<P, E>> {
        self.completed
    }
}

/// Runs sagas against a [`ServiceClient`].
///
/// Forward calls run one at a time in step order, each retried with the
/// forward retry policy. When a step gives up, the steps completed before it
/// are handed to a [`CompensationCoordinator`] and the failure is returned
/// without waiting for the compensations. Runs share no mutable state, so one
/// orchestrator can drive any number of sagas concurrently.
#[derive(Debug)]
pub struct SagaOrchestrator<C> {
    client: C,
    retry_policy: RetryPolicy,
    coordinator: CompensationCoordinator,
}

impl<C> SagaOrchestrator<C> {
    /// Orchestrator using the default policy (3 attempts, 50ms base delay)
    /// for both forward calls and compensations.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self::builder(client).build()
    }

    #[must_use]
    pub fn builder(client: C) -> OrchestratorBuilder<C> {
        OrchestratorBuilder::new(client)
    }

    pub(crate) fn from_parts(
        client: C,
        retry_policy: RetryPolicy,
        compensation_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            retry_policy,
            coordinator: CompensationCoordinator::new(compensation_policy),
        }
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    #[must_use]
    pub fn compensation_policy(&self) -> &RetryPolicy {
        self.coordinator.policy()
    }

    /// Run `steps` in order.
    ///
    /// An empty list succeeds immediately. Backoff sleeps need a tokio
    /// runtime with its time driver enabled. Compensations dispatched without
    /// a runtime are reported as aborted instead of being run.
    ///
    /// # Errors
    ///
    /// Returns `SagaError` naming the first step whose forward call exhausted
    /// its retries, with the last failure it observed. Compensation of the
    /// steps before it has been dispatched by then and is tracked by the
    /// error's `compensations` handle.
    pub async fn orchestrate<P>(
        &self,
        steps: Vec<Step<P, C::Error>>,
    ) -> Result<(), SagaError<C::Error>>
    where
        C: ServiceClient<P>,
        P: Clone + Send + Sync + 'static,
    {
        let (result, _audit_log) = self.orchestrate_with_audit(steps).await;
        result
    }

    /// Run `steps` and return both the result and an audit log.
    ///
    /// On failure the audit log shows dispatched compensations as pending;
    /// fold the finished [`CompensationReport`](crate::CompensationReport) in
    /// with [`SagaAuditLog::apply`].
    pub async fn orchestrate_with_audit<P>(
        &self,
        steps: Vec<Step<P, C::Error>>,
    ) -> (Result<(), SagaError<C::Error>>, SagaAuditLog)
    where
        C: ServiceClient<P>,
        P: Clone + Send + Sync + 'static,
    {
        let step_count = steps.len();
        let mut audit_log = SagaAuditLog::new(SagaState::initial(step_count));
        let mut record = ExecutionRecord::new();

        for (index, step) in steps.into_iter().enumerate() {
            audit_log.record_start(index, step.name());

            match self.call_forward(index, &step).await {
                Ok(retried) => {
                    let state = audit_log.state().on_step_succeeded(step_count);
                    audit_log.record_success(
                        retried.attempts,
                        step.compensation_description(),
                        state,
                    );
                    debug!(
                        step = index,
                        name = %step.name(),
                        attempts = retried.attempts,
                        "step completed"
                    );
                    record.push(step);
                }
                Err(exhausted) => {
                    let state = audit_log.state().on_step_exhausted();
                    audit_log.record_failure(exhausted.attempts, state);
                    warn!(
                        step = index,
                        name = %step.name(),
                        attempts = exhausted.attempts,
                        "step failed permanently, compensating completed steps"
                    );

                    let compensations = self.coordinator.compensate(record.into_steps());
                    audit_log.record_compensation_dispatched(&compensations.dispatch_order());

                    let error = into_saga_error(index, &step, exhausted, compensations);
                    return (Err(error), audit_log);
                }
            }
        }

        info!(steps = step_count, "saga completed");
        (Ok(()), audit_log)
    }

    async fn call_forward<P>(
        &self,
        index: usize,
        step: &Step<P, C::Error>,
    ) -> Result<Retried<()>, RetryExhausted<C::Error>>
    where
        C: ServiceClient<P>,
    {
        let client = &self.client;
        execute_with_retry(&self.retry_policy, move |ctx| {
            debug!(
                step = index,
                service = step.service_id(),
                operation = step.operation(),
                attempt = ctx.attempt,
                "invoking forward call"
            );
            client.call(step.service_id(), step.operation(), step.payload())
        })
        .await
    }
}

fn into_saga_error<P, E>(
    index: usize,
    step: &Step<P, E>,
    exhausted: RetryExhausted<E>,
    compensations: CompensationHandle<E>,
) -> SagaError<E> {
    SagaError {
        step_index: index,
        service_id: step.service_id().to_string(),
        operation: step.operation().to_string(),
        attempts: exhausted.attempts,
        deadline_exceeded: exhausted.deadline_exceeded,
        source: exhausted.last_error,
        compensations,
    }
}
