use saga_core::{CompensationReport, RetryPolicy, SagaAuditLog, SagaError};

use super::{CheckFormatter, RunFormatter};
use crate::scenario::{FailureScript, Scenario, StepConfig};
use crate::simulator::SimError;

pub(crate) struct PlainTextFormatter;

impl PlainTextFormatter {
    fn push_summary(output: &mut String, audit_log: &SagaAuditLog) {
        let summary = audit_log.summary();
        if !summary.is_empty() {
            output.push('\n');
            output.push_str(&summary);
            output.push('\n');
        }
    }

    fn describe_policy(policy: &RetryPolicy) -> String {
        let mut description = format!(
            "{} attempt(s), {}ms base delay",
            policy.max_attempts(),
            policy.base_delay().as_millis()
        );
        if let Some(deadline) = policy.deadline() {
            description.push_str(&format!(", {}ms deadline", deadline.as_millis()));
        }
        description
    }

    fn describe_script(script: FailureScript) -> Option<String> {
        if script.always_fail {
            Some("always fails".to_string())
        } else if script.fail_first > 0 {
            Some(format!("fails first {} attempt(s)", script.fail_first))
        } else {
            None
        }
    }

    fn describe_step(index: usize, step: &StepConfig) -> String {
        let mut notes = Vec::new();
        if step.read_only {
            notes.push("read-only".to_string());
        } else if let Some(description) = &step.compensation {
            notes.push(format!("compensation: {description}"));
        }
        if let Some(forward) = Self::describe_script(step.forward_script()) {
            notes.push(format!("forward {forward}"));
        }
        if let Some(undo) = Self::describe_script(step.compensation_script()) {
            notes.push(format!("compensation {undo}"));
        }

        let mut line = format!("  {index} {}.{}", step.service, step.operation);
        if !notes.is_empty() {
            line.push_str(&format!(" ({})", notes.join(", ")));
        }
        line
    }
}

impl RunFormatter for PlainTextFormatter {
    fn format_success(&self, audit_log: &SagaAuditLog) -> String {
        let mut output = format!("Saga completed: {} step(s)\n", audit_log.records().len());
        Self::push_summary(&mut output, audit_log);
        output
    }

    fn format_failure(&self, error: &SagaError<SimError>) -> String {
        let mut output = format!(
            "Saga failed at step {} ({}.{}) after {} attempt(s)\n",
            error.step_index, error.service_id, error.operation, error.attempts
        );
        output.push_str(&format!("  caused by: {}\n", error.source));
        if error.deadline_exceeded {
            output.push_str("  retry deadline exceeded\n");
        }
        if error.compensations.is_empty() {
            output.push_str("No completed steps to compensate\n");
        } else {
            output.push_str(&format!(
                "Compensating {} completed step(s)\n",
                error.compensations.len()
            ));
        }
        output
    }

    fn format_rollback(
        &self,
        report: &CompensationReport<SimError>,
        audit_log: &SagaAuditLog,
    ) -> String {
        let total = report.outcomes().len();
        let unrecovered: Vec<_> = report.unrecovered().collect();
        let mut output = String::new();

        if total > 0 {
            if unrecovered.is_empty() {
                output.push_str(&format!("Compensation: all {total} step(s) recovered\n"));
            } else {
                output.push_str(&format!(
                    "Compensation: {} of {total} step(s) left unrecovered\n",
                    unrecovered.len()
                ));
                for error in unrecovered {
                    output.push_str(&format!("  ⚠ {error}\n"));
                    if let Some(cause) = std::error::Error::source(error) {
                        output.push_str(&format!("    caused by: {cause}\n"));
                    }
                }
            }
        }

        Self::push_summary(&mut output, audit_log);
        output
    }
}

impl CheckFormatter for PlainTextFormatter {
    fn format_scenario(
        &self,
        scenario: &Scenario,
        forward: &RetryPolicy,
        compensation: &RetryPolicy,
    ) -> String {
        let mut output = format!("Scenario is valid: {} step(s)\n", scenario.steps.len());
        output.push_str(&format!("Forward retry: {}\n", Self::describe_policy(forward)));
        output.push_str(&format!(
            "Compensation retry: {}\n",
            Self::describe_policy(compensation)
        ));

        if !scenario.steps.is_empty() {
            output.push_str("\nSteps:\n");
            for (index, step) in scenario.steps.iter().enumerate() {
                output.push_str(&Self::describe_step(index, step));
                output.push('\n');
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use saga_core::SagaOrchestrator;

    use super::*;
    use crate::simulator::{SimulatedClient, build_steps};

    fn scenario(content: &str) -> Scenario {
        toml::from_str(content).expect("scenario parses")
    }

    #[tokio::test(start_paused = true)]
    async fn success_lists_every_step() {
        let scenario = scenario(
            r#"
[[steps]]
service = "inventory"
operation = "reserve"

[[steps]]
service = "payments"
operation = "charge"
fail_first = 1
"#,
        );
        let orchestrator = SagaOrchestrator::new(SimulatedClient::new(&scenario));

        let (result, audit_log) = orchestrator
            .orchestrate_with_audit(build_steps(&scenario))
            .await;

        assert!(result.is_ok());
        let output = PlainTextFormatter.format_success(&audit_log);
        assert!(output.starts_with("Saga completed: 2 step(s)\n"));
        assert!(output.contains("✓ inventory.reserve (1 attempt)"));
        assert!(output.contains("✓ payments.charge (2 attempts)"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_and_rollback_name_unrecovered_steps() {
        let scenario = scenario(
            r#"
[[steps]]
service = "inventory"
operation = "reserve"
compensation_always_fail = true

[[steps]]
service = "payments"
operation = "charge"
always_fail = true
"#,
        );
        let orchestrator = SagaOrchestrator::new(SimulatedClient::new(&scenario));

        let (result, mut audit_log) = orchestrator
            .orchestrate_with_audit(build_steps(&scenario))
            .await;
        let error = result.expect_err("charge always fails");

        let failure = PlainTextFormatter.format_failure(&error);
        assert!(failure.contains("Saga failed at step 1 (payments.charge) after 3 attempt(s)"));
        assert!(failure.contains(
            "caused by: simulated forward failure of 'payments.charge' on attempt 3"
        ));
        assert!(failure.contains("Compensating 1 completed step(s)"));

        let report = error.into_compensations().wait().await;
        audit_log.apply(&report);
        let rollback = PlainTextFormatter.format_rollback(&report, &audit_log);
        assert!(rollback.contains("Compensation: 1 of 1 step(s) left unrecovered"));
        assert!(rollback.contains("⚠ compensation for step 'inventory.reserve'"));
        assert!(rollback.contains("⚠ inventory.reserve (1 attempt; compensation 3 attempts)"));
        assert!(rollback.contains("✗ payments.charge (3 attempts)"));
    }

    #[test]
    fn scenario_listing_describes_policies_and_steps() {
        let scenario = scenario(
            r#"
[retry]
max_attempts = 4
base_delay_ms = 20
deadline_ms = 500

[[steps]]
service = "catalog"
operation = "lookup"
read_only = true

[[steps]]
service = "inventory"
operation = "reserve"
compensation = "release reserved stock"
fail_first = 2
"#,
        );
        let forward = RetryPolicy::new(4, Duration::from_millis(20))
            .expect("valid policy")
            .with_deadline(Duration::from_millis(500));

        let output =
            PlainTextFormatter.format_scenario(&scenario, &forward, &RetryPolicy::default());

        assert!(output.contains("Scenario is valid: 2 step(s)"));
        assert!(output.contains("Forward retry: 4 attempt(s), 20ms base delay, 500ms deadline"));
        assert!(output.contains("Compensation retry: 3 attempt(s), 50ms base delay\n"));
        assert!(output.contains("  0 catalog.lookup (read-only)"));
        assert!(output.contains(
            "  1 inventory.reserve (compensation: release reserved stock, forward fails first 2 attempt(s))"
        ));
    }
}
