//! TOML scenario files.
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 50
//!
//! [[steps]]
//! service = "payments"
//! operation = "charge"
//! payload = { amount = 120 }
//! fail_first = 1
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use saga_core::RetryPolicy;
use serde::Deserialize;

use crate::error::{CliError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) retry: PolicyConfig,
    #[serde(default)]
    pub(crate) compensation: PolicyConfig,
    #[serde(default)]
    pub(crate) steps: Vec<StepConfig>,
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario: Self = toml::from_str(&content).map_err(|source| CliError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        self.retry.to_policy("retry")?;
        self.compensation.to_policy("compensation")?;
        for (index, step) in self.steps.iter().enumerate() {
            step.validate()
                .map_err(|reason| CliError::InvalidStep { index, reason })?;
        }
        Ok(())
    }
}

/// Retry settings of one `[retry]` or `[compensation]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub(crate) max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub(crate) base_delay_ms: u64,
    #[serde(default)]
    pub(crate) deadline_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    RetryPolicy::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    u64::try_from(RetryPolicy::DEFAULT_BASE_DELAY.as_millis()).unwrap_or(u64::MAX)
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            deadline_ms: None,
        }
    }
}

impl PolicyConfig {
    /// Replace the attempt budget and base delay where a value is given.
    #[must_use]
    pub(crate) fn with_overrides(
        mut self,
        max_attempts: Option<u32>,
        base_delay_ms: Option<u64>,
    ) -> Self {
        if let Some(max_attempts) = max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = base_delay_ms {
            self.base_delay_ms = base_delay_ms;
        }
        self
    }

    pub(crate) fn to_policy(self, table: &'static str) -> Result<RetryPolicy> {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
            .map_err(|source| CliError::Policy { table, source })?;
        Ok(match self.deadline_ms {
            Some(deadline_ms) => policy.with_deadline(Duration::from_millis(deadline_ms)),
            None => policy,
        })
    }
}

/// Failure behaviour scripted for a simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct FailureScript {
    pub(crate) fail_first: u32,
    pub(crate) always_fail: bool,
}

impl FailureScript {
    /// Whether the 1-based `attempt` fails.
    #[must_use]
    pub(crate) fn fails(self, attempt: u32) -> bool {
        self.always_fail || attempt <= self.fail_first
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StepConfig {
    pub(crate) service: String,
    pub(crate) operation: String,
    #[serde(default = "empty_payload")]
    pub(crate) payload: toml::Value,
    #[serde(default)]
    pub(crate) fail_first: u32,
    #[serde(default)]
    pub(crate) always_fail: bool,
    #[serde(default)]
    pub(crate) compensation_fail_first: u32,
    #[serde(default)]
    pub(crate) compensation_always_fail: bool,
    /// The step has nothing to undo.
    #[serde(default)]
    pub(crate) read_only: bool,
    /// Overrides the default compensation description.
    #[serde(default)]
    pub(crate) compensation: Option<String>,
}

fn empty_payload() -> toml::Value {
    toml::Value::Table(toml::Table::new())
}

impl StepConfig {
    #[must_use]
    pub(crate) fn forward_script(&self) -> FailureScript {
        FailureScript {
            fail_first: self.fail_first,
            always_fail: self.always_fail,
        }
    }

    #[must_use]
    pub(crate) fn compensation_script(&self) -> FailureScript {
        FailureScript {
            fail_first: self.compensation_fail_first,
            always_fail: self.compensation_always_fail,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.service.trim().is_empty() {
            return Err("service must not be empty".to_string());
        }
        if self.operation.trim().is_empty() {
            return Err("operation must not be empty".to_string());
        }
        if self.read_only
            && (self.compensation.is_some() || self.compensation_script() != FailureScript::default())
        {
            return Err(format!(
                "'{}.{}' is read-only and cannot configure a compensation",
                self.service, self.operation
            ));
        }
        Ok(())
    }
}
