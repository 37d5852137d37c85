//! Bounded retry for optimistic conflicts
//!
//! [`retry_on_conflict`] re-runs an operation while it fails with a
//! retryable error (`Conflict`), sleeping between attempts according to a
//! [`Backoff`]. Any other error stops the loop immediately. When the attempt
//! budget is spent the last `Conflict` is returned, never swallowed.

use pipeline_core::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default attempt budget
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay after every failed attempt
    Fixed {
        /// Delay in milliseconds
        delay_ms: u64,
    },
    /// Doubling delay, capped
    Exponential {
        /// Delay after the first failed attempt
        base_ms: u64,
        /// Upper bound
        max_ms: u64,
    },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let cap = max_ms.max(base_ms);
                let mut delay = base_ms;
                for _ in 1..attempt {
                    delay = delay.saturating_mul(2).min(cap);
                }
                Duration::from_millis(delay.min(cap))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base_ms: 10,
            max_ms: 100,
        }
    }
}

/// Attempt budget plus delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay between attempts
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with the given budget and schedule
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, no retry
    pub fn no_retry() -> Self {
        Self::new(1, Backoff::None)
    }

    /// Same schedule, different budget
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Backoff::default())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's budget is spent
///
/// `op` receives the 1-based attempt number. A budget of zero is treated as
/// one attempt.
pub fn retry_on_conflict<T>(policy: &RetryPolicy, op: impl FnMut(u32) -> Result<T>) -> Result<T> {
    retry_with_sleep(policy, std::thread::sleep, op)
}

/// [`retry_on_conflict`] with an injectable sleep
pub fn retry_with_sleep<T>(
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut op: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after conflict");
                if !delay.is_zero() {
                    sleep(delay);
                }
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(attempts = attempt, error = %err, "retry budget exhausted");
                }
                return Err(err);
            }
        }
    }
}
