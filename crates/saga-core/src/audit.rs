use tokio::time::Instant;

use crate::compensation::{CompensationReport, CompensationStatus};
use crate::error::CompensationError;
use crate::orchestrator::SagaState;

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Forward call is in flight.
    Running,
    /// Forward call succeeded.
    Executed,
    /// Forward call exhausted its retries.
    Failed,
    /// Compensation task was dispatched and has not been folded in yet.
    CompensationDispatched,
    /// Step was compensated successfully.
    Compensated,
    /// Step compensation failed; the step is unrecovered.
    CompensationFailed,
}

/// Record of a step's execution in the saga.
#[derive(Debug)]
pub struct StepRecord {
    /// Zero-based position of the step in the saga.
    pub index: usize,
    /// Name of the step (`service.operation`).
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Forward attempts made.
    pub attempts: u32,
    /// When the step started executing.
    pub started_at: Instant,
    /// When the step completed (forward call or compensation).
    pub completed_at: Option<Instant>,
    /// Description of compensation (if applicable).
    pub compensation_description: Option<String>,
    /// Compensation attempts made, once the outcome has been applied.
    pub compensation_attempts: Option<u32>,
}

/// Audit log tracking all step executions in a saga.
#[derive(Debug)]
pub struct SagaAuditLog {
    records: Vec<StepRecord>,
    state: SagaState,
}

impl SagaAuditLog {
    pub(crate) fn new(state: SagaState) -> Self {
        Self {
            records: Vec::new(),
            state,
        }
    }

    /// Record a step execution starting.
    pub(crate) fn record_start(&mut self, index: usize, name: String) {
        self.records.push(StepRecord {
            index,
            name,
            status: StepStatus::Running,
            attempts: 0,
            started_at: Instant::now(),
            completed_at: None,
            compensation_description: None,
            compensation_attempts: None,
        });
    }

    /// Mark the last step as completed successfully.
    pub(crate) fn record_success(
        &mut self,
        attempts: u32,
        compensation_description: String,
        state: SagaState,
    ) {
        if let Some(record) = self.records.last_mut() {
            record.status = StepStatus::Executed;
            record.attempts = attempts;
            record.completed_at = Some(Instant::now());
            record.compensation_description = Some(compensation_description);
        }
        self.state = state;
    }

    /// Mark the last step as failed.
    pub(crate) fn record_failure(&mut self, attempts: u32, state: SagaState) {
        if let Some(record) = self.records.last_mut() {
            record.status = StepStatus::Failed;
            record.attempts = attempts;
            record.completed_at = Some(Instant::now());
        }
        self.state = state;
    }

    /// Mark the steps whose compensation tasks were dispatched.
    pub(crate) fn record_compensation_dispatched(&mut self, indices: &[usize]) {
        for record in &mut self.records {
            if indices.contains(&record.index) {
                record.status = StepStatus::CompensationDispatched;
            }
        }
    }

    /// Fold finished compensation outcomes into the log.
    pub fn apply<E>(&mut self, report: &CompensationReport<E>) {
        for outcome in report.outcomes() {
            let (status, attempts) = match &outcome.status {
                CompensationStatus::Compensated { attempts } => {
                    (StepStatus::Compensated, Some(*attempts))
                }
                CompensationStatus::Unrecovered(CompensationError::Exhausted {
                    attempts, ..
                }) => (StepStatus::CompensationFailed, Some(*attempts)),
                CompensationStatus::Unrecovered(CompensationError::Aborted { .. }) => {
                    (StepStatus::CompensationFailed, None)
                }
            };
            if let Some(record) = self.records.iter_mut().find(|r| r.index == outcome.step_index) {
                record.status = status;
                record.compensation_attempts = attempts;
                record.completed_at = Some(Instant::now());
            }
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// State the saga run ended in.
    #[must_use]
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Get a summary of the saga execution for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Running => "…",
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::CompensationDispatched => "⇠",
                StepStatus::Compensated => "↩",
                StepStatus::CompensationFailed => "⚠",
            };
            let mut line = format!(
                "{status} {} ({} attempt{}",
                record.name,
                record.attempts,
                plural(record.attempts)
            );
            if let Some(attempts) = record.compensation_attempts {
                line.push_str(&format!(
                    "; compensation {attempts} attempt{}",
                    plural(attempts)
                ));
            }
            line.push(')');
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn plural(count: u32) -> &'static str {
    if count == 1 { "" } else { "s" }
}
