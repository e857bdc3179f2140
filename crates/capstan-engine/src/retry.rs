use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-object retry policy.
///
/// A failing object is re-attempted on later drain passes with exponential
/// backoff until it exhausts `max_attempts`, at which point it is
/// dead-lettered: recorded in the failed namespace and dropped from the
/// pending queue. Dead letters are never retried automatically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before an object is dead-lettered. Minimum 1.
    pub max_attempts: u32,
    /// Backoff after the first failure, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt after `attempts` failures:
    /// `base * 2^(attempts-1)`, capped at `max_delay_ms`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Returns `true` once `attempts` failures exhaust the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts.max(1)
    }
}
