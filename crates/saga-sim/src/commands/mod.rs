mod check;
mod run;

use clap::Subcommand;

use crate::error::Result;

pub(crate) use check::CheckArgs;
pub(crate) use run::RunArgs;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Execute a scenario against simulated services
    Run(RunArgs),
    /// Validate a scenario file and list its steps
    Check(CheckArgs),
}

impl Commands {
    pub(crate) fn execute(self) -> Result<()> {
        match self {
            Self::Run(args) => run::run(&args),
            Self::Check(args) => check::run(&args),
        }
    }
}
