use std::path::PathBuf;

use clap::Args;
use saga_core::{RetryPolicy, SagaOrchestrator};
use tracing::info;

use crate::error::{CliError, Result};
use crate::output::{PlainTextFormatter, RunFormatter};
use crate::scenario::Scenario;
use crate::simulator::{SimulatedClient, build_steps};

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Scenario file to execute
    pub(crate) scenario: PathBuf,

    /// Override the forward attempt budget from the scenario
    #[arg(long)]
    pub(crate) max_attempts: Option<u32>,

    /// Override the forward base delay (milliseconds) from the scenario
    #[arg(long)]
    pub(crate) base_delay_ms: Option<u64>,
}

pub(crate) fn run(args: &RunArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let forward = scenario
        .retry
        .with_overrides(args.max_attempts, args.base_delay_ms)
        .to_policy("retry")?;
    let compensation = scenario.compensation.to_policy("compensation")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(execute(&scenario, forward, compensation))
}

async fn execute(
    scenario: &Scenario,
    forward: RetryPolicy,
    compensation: RetryPolicy,
) -> Result<()> {
    let orchestrator = SagaOrchestrator::builder(SimulatedClient::new(scenario))
        .retry_policy(forward)
        .compensation_policy(compensation)
        .build();
    let formatter = PlainTextFormatter;

    info!(steps = scenario.steps.len(), "running scenario");
    let (result, mut audit_log) = orchestrator
        .orchestrate_with_audit(build_steps(scenario))
        .await;

    let error = match result {
        Ok(()) => {
            print!("{}", formatter.format_success(&audit_log));
            return Ok(());
        }
        Err(error) => error,
    };

    print!("{}", formatter.format_failure(&error));
    let step_index = error.step_index;
    let step = format!("{}.{}", error.service_id, error.operation);

    let report = error.into_compensations().wait().await;
    audit_log.apply(&report);
    print!("{}", formatter.format_rollback(&report, &audit_log));

    Err(CliError::SagaFailed {
        step_index,
        step,
        unrecovered: report.unrecovered().count(),
    })
}
