//! Simulated collaborators driven by a scenario's failure scripts.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use saga_core::{ServiceClient, Step};
use thiserror::Error;
use tracing::{debug, info};

use crate::scenario::{FailureScript, Scenario, StepConfig};

/// Payload handed to forward calls and compensations.
#[derive(Debug, Clone)]
pub(crate) struct SimPayload {
    /// Index of the step in the scenario.
    pub(crate) step: usize,
    pub(crate) body: toml::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Forward,
    Compensation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("forward"),
            Self::Compensation => f.write_str("compensation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("simulated {phase} failure of '{service}.{operation}' on attempt {attempt}")]
pub(crate) struct SimError {
    pub(crate) phase: Phase,
    pub(crate) service: String,
    pub(crate) operation: String,
    pub(crate) attempt: u32,
}

/// Answers forward calls according to each step's `fail_first` and
/// `always_fail` settings.
pub(crate) struct SimulatedClient {
    scripts: Vec<FailureScript>,
    attempts: Vec<AtomicU32>,
}

impl SimulatedClient {
    pub(crate) fn new(scenario: &Scenario) -> Self {
        Self {
            scripts: scenario.steps.iter().map(StepConfig::forward_script).collect(),
            attempts: scenario.steps.iter().map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Forward calls received so far for the step at `index`.
    #[cfg(test)]
    pub(crate) fn attempts(&self, index: usize) -> u32 {
        self.attempts
            .get(index)
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }
}

impl ServiceClient<SimPayload> for SimulatedClient {
    type Error = SimError;

    async fn call(
        &self,
        service_id: &str,
        operation: &str,
        payload: &SimPayload,
    ) -> Result<(), SimError> {
        let attempt = self
            .attempts
            .get(payload.step)
            .map_or(1, |count| count.fetch_add(1, Ordering::SeqCst) + 1);
        let script = self.scripts.get(payload.step).copied().unwrap_or_default();

        if script.fails(attempt) {
            debug!(service = service_id, operation, attempt, "simulated forward failure");
            return Err(SimError {
                phase: Phase::Forward,
                service: service_id.to_string(),
                operation: operation.to_string(),
                attempt,
            });
        }

        info!(
            service = service_id,
            operation,
            attempt,
            payload = %payload.body,
            "forward call applied"
        );
        Ok(())
    }
}

/// Turn the scenario's step tables into saga steps.
///
/// Each compensation counts its own attempts and fails according to the
/// step's `compensation_fail_first` and `compensation_always_fail` settings.
pub(crate) fn build_steps(scenario: &Scenario) -> Vec<Step<SimPayload, SimError>> {
    scenario
        .steps
        .iter()
        .enumerate()
        .map(|(index, config)| build_step(index, config))
        .collect()
}

fn build_step(index: usize, config: &StepConfig) -> Step<SimPayload, SimError> {
    let payload = SimPayload {
        step: index,
        body: config.payload.clone(),
    };

    if config.read_only {
        return Step::read_only(&config.service, &config.operation, payload);
    }

    let script = config.compensation_script();
    let attempts = Arc::new(AtomicU32::new(0));
    let service = config.service.clone();
    let operation = config.operation.clone();

    let step = Step::new(
        &config.service,
        &config.operation,
        payload,
        move |payload: SimPayload| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let result = if script.fails(attempt) {
                Err(SimError {
                    phase: Phase::Compensation,
                    service: service.clone(),
                    operation: operation.clone(),
                    attempt,
                })
            } else {
                info!(
                    step = payload.step,
                    service = %service,
                    operation = %operation,
                    attempt,
                    "compensation applied"
                );
                Ok(())
            };
            async move { result }
        },
    );

    match &config.compensation {
        Some(description) => step.with_compensation_description(description),
        None => step,
    }
}
