//! Bounded retry with exponential backoff for storage writes.
//!
//! `decide` is pure: attempt number, error class, and policy in; a decision
//! out. `with_retry` is the thin loop that sleeps between attempts.

use screenlab_core::store::{StorageError, StorageErrorKind};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Decision after failed attempt number `attempt` (1-based).
///
/// Delay: `base_delay * 2^(attempt-1)`, capped at `max_delay`.
pub fn decide(attempt: u32, kind: StorageErrorKind, policy: &RetryPolicy) -> RetryDecision {
    if kind == StorageErrorKind::Permanent || attempt >= policy.max_attempts {
        return RetryDecision::GiveUp;
    }
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let delay = policy.base_delay.saturating_mul(factor).min(policy.max_delay);
    RetryDecision::RetryAfter(delay)
}

/// Run `op` until it succeeds or `decide` gives up. Returns the last error.
pub fn with_retry<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Result<T, StorageError>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => match decide(attempt, e.kind(), policy) {
                RetryDecision::GiveUp => return Err(e),
                RetryDecision::RetryAfter(delay) => {
                    warn!(what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying storage write");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            },
        }
    }
}
