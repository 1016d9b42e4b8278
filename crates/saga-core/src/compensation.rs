//! Concurrent, best-effort rollback of completed steps.

use std::fmt;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CompensationError;
use crate::retry::{RetryPolicy, execute_with_retry};
use crate::step::Step;

/// Fires the compensations of completed steps as independent tokio tasks.
///
/// Tasks are dispatched last-completed first; once dispatched they run
/// concurrently and finish in any order. Each compensation is retried with
/// the coordinator's policy and its failure never affects the others.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompensationCoordinator {
    policy: RetryPolicy,
}

impl CompensationCoordinator {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch one compensation task per step, in reverse order.
    ///
    /// `completed` holds the steps whose forward call succeeded, in the order
    /// they completed; position `i` is reported as step index `i`. Returns
    /// without waiting for any task.
    ///
    /// Outside a tokio runtime nothing can be spawned: every step is then
    /// reported as `CompensationError::Aborted` by [`CompensationHandle::wait`].
    pub fn compensate<P, E>(&self, mut completed: Vec<Step<P, E>>) -> CompensationHandle<E>
    where
        P: Clone + Send + Sync + 'static,
        E: Send + 'static,
    {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() && !completed.is_empty() {
            warn!(
                steps = completed.len(),
                "no tokio runtime available, compensations cannot be dispatched"
            );
        }
        let mut pending = Vec::with_capacity(completed.len());

        while let Some(step) = completed.pop() {
            let step_index = completed.len();
            let name = step.name();
            let description = step.compensation_description();
            debug!(step = step_index, name = %name, "dispatching compensation");

            let task = runtime.as_ref().map(|runtime| {
                runtime.spawn(run_compensation(
                    self.policy,
                    step_index,
                    step,
                    name.clone(),
                    description.clone(),
                ))
            });

            pending.push(PendingCompensation {
                step_index,
                step: name,
                description,
                task,
            });
        }

        CompensationHandle { pending }
    }
}

async fn run_compensation<P, E>(
    policy: RetryPolicy,
    step_index: usize,
    step: Step<P, E>,
    name: String,
    description: String,
) -> CompensationOutcome<E>
where
    P: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    let result = execute_with_retry(&policy, |_| {
        step.compensation().compensate(step.payload().clone())
    })
    .await;

    let status = match result {
        Ok(retried) => {
            debug!(
                step = step_index,
                name = %name,
                attempts = retried.attempts,
                "step compensated"
            );
            CompensationStatus::Compensated {
                attempts: retried.attempts,
            }
        }
        Err(exhausted) => {
            warn!(
                step = step_index,
                name = %name,
                attempts = exhausted.attempts,
                "compensation exhausted its retries, step left unrecovered"
            );
            CompensationStatus::Unrecovered(CompensationError::Exhausted {
                step: name.clone(),
                description: description.clone(),
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })
        }
    };

    CompensationOutcome {
        step_index,
        step: name,
        description,
        status,
    }
}

/// Final state of one step's compensation.
#[derive(Debug)]
pub enum CompensationStatus<E> {
    Compensated { attempts: u32 },
    /// The step's forward effect could not be undone.
    Unrecovered(CompensationError<E>),
}

impl<E> CompensationStatus<E> {
    #[must_use]
    pub fn is_compensated(&self) -> bool {
        matches!(self, Self::Compensated { .. })
    }
}

/// Result of compensating a single step.
#[derive(Debug)]
pub struct CompensationOutcome<E> {
    /// Zero-based index of the compensated step within the saga.
    pub step_index: usize,
    /// Name of the step (`service.operation`).
    pub step: String,
    /// Description of what the compensation does.
    pub description: String,
    pub status: CompensationStatus<E>,
}

/// Outcomes of every dispatched compensation, in dispatch order.
#[derive(Debug)]
pub struct CompensationReport<E> {
    outcomes: Vec<CompensationOutcome<E>>,
}

impl<E> CompensationReport<E> {
    #[must_use]
    pub fn outcomes(&self) -> &[CompensationOutcome<E>] {
        &self.outcomes
    }

    #[must_use]
    pub fn into_outcomes(self) -> Vec<CompensationOutcome<E>> {
        self.outcomes
    }

    /// Errors of the steps whose compensation could not be carried out.
    pub fn unrecovered(&self) -> impl Iterator<Item = &CompensationError<E>> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            CompensationStatus::Unrecovered(error) => Some(error),
            CompensationStatus::Compensated { .. } => None,
        })
    }

    #[must_use]
    pub fn is_fully_recovered(&self) -> bool {
        self.unrecovered().next().is_none()
    }
}

struct PendingCompensation<E> {
    step_index: usize,
    step: String,
    description: String,
    /// `None` when no runtime was available to spawn onto.
    task: Option<JoinHandle<CompensationOutcome<E>>>,
}

/// Handle on the compensation tasks dispatched for a failed saga.
///
/// Dropping the handle, or calling [`detach`](Self::detach), leaves the tasks
/// running; [`wait`](Self::wait) collects their outcomes.
pub struct CompensationHandle<E> {
    pending: Vec<PendingCompensation<E>>,
}

impl<E> CompensationHandle<E> {
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Step indices in the order their compensations were dispatched.
    #[must_use]
    pub fn dispatch_order(&self) -> Vec<usize> {
        self.pending.iter().map(|p| p.step_index).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True once every dispatched task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending
            .iter()
            .all(|p| p.task.as_ref().is_none_or(JoinHandle::is_finished))
    }

    /// Stop tracking the tasks without cancelling them.
    pub fn detach(self) {}

    /// Wait for every dispatched compensation and collect the outcomes.
    ///
    /// A task that panicked, was cancelled or never started for lack of a
    /// runtime is reported as `CompensationError::Aborted`.
    pub async fn wait(self) -> CompensationReport<E> {
        let mut outcomes = Vec::with_capacity(self.pending.len());

        for pending in self.pending {
            let joined = match pending.task {
                Some(task) => task.await.map_err(|join_error| {
                    if join_error.is_panic() {
                        "task panicked"
                    } else {
                        "task was cancelled"
                    }
                }),
                None => Err("no tokio runtime to run the task"),
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(reason) => {
                    warn!(
                        step = pending.step_index,
                        name = %pending.step,
                        reason,
                        "compensation task ended abnormally"
                    );
                    CompensationOutcome {
                        step_index: pending.step_index,
                        step: pending.step.clone(),
                        description: pending.description.clone(),
                        status: CompensationStatus::Unrecovered(CompensationError::Aborted {
                            step: pending.step,
                            description: pending.description,
                            reason: reason.to_string(),
                        }),
                    }
                }
            };
            outcomes.push(outcome);
        }

        CompensationReport { outcomes }
    }
}

impl<E> fmt::Debug for CompensationHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensationHandle")
            .field("dispatch_order", &self.dispatch_order())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("{0}")]
    struct TestError(String);

    fn recording_step(index: usize, log: &Arc<Mutex<Vec<usize>>>) -> Step<usize, TestError> {
        let log = Arc::clone(log);
        Step::new("svc", format!("op{index}"), index, move |payload: usize| {
            let log = Arc::clone(&log);
            async move {
                log.lock().expect("log lock").push(payload);
                Ok::<(), TestError>(())
            }
        })
    }

    fn flaky_step(index: usize, failures: u32, calls: &Arc<AtomicU32>) -> Step<usize, TestError> {
        let calls = Arc::clone(calls);
        Step::new("svc", format!("op{index}"), index, move |_: usize| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt <= failures {
                    Err(TestError(format!("attempt {attempt} failed")))
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_in_reverse_completion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = (0..3).map(|i| recording_step(i, &log)).collect();

        let handle = CompensationCoordinator::default().compensate(steps);

        assert_eq!(handle.dispatch_order(), vec![2, 1, 0]);
        let report = handle.wait().await;
        assert!(report.is_fully_recovered());
        let mut compensated = log.lock().expect("log lock").clone();
        compensated.sort_unstable();
        assert_eq!(compensated, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_are_reported_in_dispatch_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = (0..2).map(|i| recording_step(i, &log)).collect();

        let report = CompensationCoordinator::default()
            .compensate(steps)
            .wait()
            .await;

        let indices: Vec<usize> = report.outcomes().iter().map(|o| o.step_index).collect();
        assert_eq!(indices, vec![1, 0]);
        assert_eq!(report.outcomes()[0].step, "svc.op1");
        assert_eq!(report.outcomes()[0].description, "undo op1 on svc");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_record_dispatches_nothing() {
        let steps: Vec<Step<u8, TestError>> = Vec::new();

        let handle = CompensationCoordinator::default().compensate(steps);

        assert!(handle.is_empty());
        assert!(handle.is_finished());
        assert!(handle.wait().await.outcomes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_compensation_failure_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let report = CompensationCoordinator::default()
            .compensate(vec![flaky_step(0, 2, &calls)])
            .wait()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            report.outcomes()[0].status,
            CompensationStatus::Compensated { attempts: 3 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_compensation_does_not_affect_others() {
        let failing_calls = Arc::new(AtomicU32::new(0));
        let healthy_calls = Arc::new(AtomicU32::new(0));
        let steps = vec![
            flaky_step(0, u32::MAX, &failing_calls),
            flaky_step(1, 0, &healthy_calls),
        ];

        let report = CompensationCoordinator::default()
            .compensate(steps)
            .wait()
            .await;

        assert_eq!(failing_calls.load(Ordering::SeqCst), 3);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
        assert!(report.outcomes()[0].status.is_compensated());
        let unrecovered: Vec<_> = report.unrecovered().collect();
        assert_eq!(unrecovered.len(), 1);
        assert!(matches!(
            unrecovered[0],
            CompensationError::Exhausted { attempts: 3, step, source, .. }
                if step == "svc.op0" && *source == TestError("attempt 3 failed".to_string())
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn compensation_policy_is_applied() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10)).expect("valid policy");

        let report = CompensationCoordinator::new(policy)
            .compensate(vec![flaky_step(0, u32::MAX, &calls)])
            .wait()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(!report.is_fully_recovered());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_compensation_is_reported_as_aborted() {
        let step: Step<u32, TestError> = Step::new("ledger", "post", 7, |amount: u32| async move {
            assert!(amount == 0, "ledger rejected amount {amount}");
            Ok::<(), TestError>(())
        });

        let report = CompensationCoordinator::default()
            .compensate(vec![step])
            .wait()
            .await;

        let unrecovered: Vec<_> = report.unrecovered().collect();
        assert!(matches!(
            unrecovered.as_slice(),
            [CompensationError::Aborted { reason, .. }] if reason == "task panicked"
        ));
    }

    #[test]
    fn compensating_outside_a_runtime_reports_aborted_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = (0..2).map(|i| recording_step(i, &log)).collect();

        let handle = CompensationCoordinator::default().compensate(steps);

        assert_eq!(handle.dispatch_order(), vec![1, 0]);
        assert!(handle.is_finished());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("build runtime");
        let report = runtime.block_on(handle.wait());
        let reasons: Vec<_> = report
            .unrecovered()
            .map(|error| match error {
                CompensationError::Aborted { reason, .. } => reason.as_str(),
                CompensationError::Exhausted { .. } => "exhausted",
            })
            .collect();
        assert_eq!(reasons, vec!["no tokio runtime to run the task"; 2]);
        assert!(log.lock().expect("log lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn detached_tasks_keep_running() {
        let calls = Arc::new(AtomicU32::new(0));

        CompensationCoordinator::default()
            .compensate(vec![flaky_step(0, 1, &calls)])
            .detach();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
