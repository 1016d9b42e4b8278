//! Bounded retry with exponential backoff.
//!
//! [`execute_with_retry`] is generic over the operation it wraps: the
//! orchestrator uses it for forward calls and the compensation coordinator
//! for undo actions, each with its own [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::{PolicyError, RetryExhausted};

/// How many times an operation is attempted and how long to wait in between.
///
/// After failed attempt *i* (1-based) the executor sleeps
/// `base_delay * 2^(i-1)` before attempt *i + 1*. An optional deadline bounds
/// the total time spent; it can stop retrying early but never changes the
/// delays themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay: Self::DEFAULT_BASE_DELAY,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

    /// Create a policy without a deadline.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::ZeroAttempts` if `max_attempts` is zero.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            base_delay,
            deadline: None,
        })
    }

    /// Stop retrying once the next backoff would end past `deadline`,
    /// measured from the first attempt.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Backoff slept after failed attempt `attempt` (1-based).
    ///
    /// Saturates at `Duration::MAX` once `base_delay * 2^(attempt-1)` no
    /// longer fits.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1);
        1_u128
            .checked_shl(exponent)
            .and_then(|factor| self.base_delay.as_nanos().checked_mul(factor))
            .and_then(duration_from_nanos)
            .unwrap_or(Duration::MAX)
    }
}

/// Per-attempt bookkeeping handed to the retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempt budget of the policy in effect.
    pub max_attempts: u32,
    /// Backoff before the next attempt if this one fails; `None` on the last.
    pub next_delay: Option<Duration>,
}

impl AttemptContext {
    fn new(policy: &RetryPolicy, attempt: u32) -> Self {
        let next_delay = (attempt < policy.max_attempts).then(|| policy.delay_after(attempt));
        Self {
            attempt,
            max_attempts: policy.max_attempts,
            next_delay,
        }
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_delay.is_none()
    }
}

/// Successful result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    /// Number of invocations it took, including the successful one.
    pub attempts: u32,
}

/// Invoke `operation` until it succeeds or the policy gives up.
///
/// Returns on the first success. The backoff sleep suspends only the calling
/// task.
///
/// # Errors
///
/// Returns `RetryExhausted` carrying the last failure when every attempt
/// failed or the deadline left no room for another attempt.
pub async fn execute_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<Retried<T>, RetryExhausted<E>>
where
    F: FnMut(AttemptContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut attempt = 1;

    loop {
        let ctx = AttemptContext::new(policy, attempt);

        let last_error = match operation(ctx).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        let Some(delay) = ctx.next_delay else {
            warn!(attempts = attempt, "retry budget exhausted");
            return Err(RetryExhausted {
                attempts: attempt,
                deadline_exceeded: false,
                last_error,
            });
        };

        if let Some(deadline) = policy.deadline {
            let resumes_at = started.elapsed().checked_add(delay);
            if resumes_at.is_none_or(|resumes_at| resumes_at > deadline) {
                warn!(
                    attempts = attempt,
                    deadline_ms = duration_ms(deadline),
                    "retry deadline leaves no room for another attempt"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    deadline_exceeded: true,
                    last_error,
                });
            }
        }

        debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = duration_ms(delay),
            "attempt failed, backing off"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

fn duration_from_nanos(nanos: u128) -> Option<Duration> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    let subsec_nanos = u32::try_from(nanos % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, subsec_nanos))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
