//! Saga orchestration across independent services.
//!
//! A saga is an ordered list of [`Step`]s. Each step performs a forward call
//! against a remote collaborator and carries a compensation that undoes it.
//! Forward calls run strictly in order, each retried with exponential
//! backoff. When a step exhausts its retries, every step that already
//! completed is compensated: compensations are dispatched last-completed
//! first and run concurrently as tokio tasks, while the orchestrator returns
//! the failure immediately. The returned [`CompensationHandle`] lets callers
//! that need rollback confirmation wait for the [`CompensationReport`].
//!
//! Compensations must be safe to repeat. The orchestrator cannot tell a
//! failed attempt from a successful one whose acknowledgement was lost, and
//! saga state is kept in memory only.

mod audit;
mod builder;
mod compensation;
mod error;
mod orchestrator;
mod retry;
mod step;

pub use audit::{SagaAuditLog, StepRecord, StepStatus};
pub use builder::OrchestratorBuilder;
pub use compensation::{
    CompensationCoordinator, CompensationHandle, CompensationOutcome, CompensationReport,
    CompensationStatus,
};
pub use error::{CompensationError, PolicyError, RetryExhausted, SagaError};
pub use orchestrator::{SagaOrchestrator, SagaState, ServiceClient};
pub use retry::{AttemptContext, RetryPolicy, Retried, execute_with_retry};
pub use step::{BoxFuture, Compensation, Step};
