use saga_core::{CompensationReport, RetryPolicy, SagaAuditLog, SagaError};

use crate::scenario::Scenario;
use crate::simulator::SimError;

pub(crate) trait RunFormatter {
    fn format_success(&self, audit_log: &SagaAuditLog) -> String;
    fn format_failure(&self, error: &SagaError<SimError>) -> String;
    fn format_rollback(
        &self,
        report: &CompensationReport<SimError>,
        audit_log: &SagaAuditLog,
    ) -> String;
}

pub(crate) trait CheckFormatter {
    fn format_scenario(
        &self,
        scenario: &Scenario,
        forward: &RetryPolicy,
        compensation: &RetryPolicy,
    ) -> String;
}
