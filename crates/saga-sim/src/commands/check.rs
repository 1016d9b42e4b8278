use std::path::PathBuf;

use clap::Args;

use crate::error::Result;
use crate::output::{CheckFormatter, PlainTextFormatter};
use crate::scenario::Scenario;

#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Scenario file to validate
    pub(crate) scenario: PathBuf,
}

pub(crate) fn run(args: &CheckArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let forward = scenario.retry.to_policy("retry")?;
    let compensation = scenario.compensation.to_policy("compensation")?;

    print!(
        "{}",
        PlainTextFormatter.format_scenario(&scenario, &forward, &compensation)
    );
    Ok(())
}
