use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Undo action paired with a step.
///
/// Receives the same payload the forward call received. Implementations must
/// tolerate being invoked more than once, and must tolerate the forward
/// effect being only partially applied remotely.
///
/// Any `Fn(P) -> impl Future<Output = Result<(), E>>` closure implements this
/// trait.
pub trait Compensation<P, E>: Send + Sync {
    /// Undo the step's effects.
    fn compensate(&self, payload: P) -> BoxFuture<'static, Result<(), E>>;
}

impl<P, E, F, Fut> Compensation<P, E> for F
where
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    fn compensate(&self, payload: P) -> BoxFuture<'static, Result<(), E>> {
        Box::pin(self(payload))
    }
}

/// One unit of forward work and its paired undo action.
///
/// The forward call is performed by the orchestrator's
/// [`ServiceClient`](crate::ServiceClient) using `service_id`, `operation` and
/// `payload`; the compensation is carried by the step itself.
pub struct Step<P, E> {
    service_id: String,
    operation: String,
    payload: P,
    compensation: Box<dyn Compensation<P, E>>,
    compensation_description: Option<String>,
}

impl<P, E> Step<P, E>
where
    P: Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new(
        service_id: impl Into<String>,
        operation: impl Into<String>,
        payload: P,
        compensation: impl Compensation<P, E> + 'static,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            operation: operation.into(),
            payload,
            compensation: Box::new(compensation),
            compensation_description: None,
        }
    }

    /// A step whose forward call has no effect to undo.
    ///
    /// Its compensation succeeds immediately without contacting anyone.
    #[must_use]
    pub fn read_only(
        service_id: impl Into<String>,
        operation: impl Into<String>,
        payload: P,
    ) -> Self {
        Self::new(service_id, operation, payload, |_: P| {
            future::ready(Ok::<(), E>(()))
        })
        .with_compensation_description("nothing to undo")
    }
}

impl<P, E> Step<P, E> {
    /// Override the human-readable description of the compensation.
    #[must_use]
    pub fn with_compensation_description(mut self, description: impl Into<String>) -> Self {
        self.compensation_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Name used in logs, audit records and errors: `service.operation`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.service_id, self.operation)
    }

    /// Human-readable description of what compensation will do.
    #[must_use]
    pub fn compensation_description(&self) -> String {
        match &self.compensation_description {
            Some(description) => description.clone(),
            None => format!("undo {} on {}", self.operation, self.service_id),
        }
    }

    pub(crate) fn compensation(&self) -> &dyn Compensation<P, E> {
        self.compensation.as_ref()
    }
}

impl<P: fmt::Debug, E> fmt::Debug for Step<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("service_id", &self.service_id)
            .field("operation", &self.operation)
            .field("payload", &self.payload)
            .field("compensation", &self.compensation_description())
            .finish_non_exhaustive()
    }
}
