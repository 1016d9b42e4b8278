use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read scenario '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid [{table}] policy")]
    Policy {
        table: &'static str,
        #[source]
        source: saga_core::PolicyError,
    },

    #[error("step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    #[error("failed to start async runtime")]
    Runtime(#[source] std::io::Error),

    #[error("saga failed at step {step_index} ('{step}'); {unrecovered} step(s) left unrecovered")]
    SagaFailed {
        step_index: usize,
        step: String,
        unrecovered: usize,
    },
}

pub type Result<T> = std::result::Result<T, CliError>;
