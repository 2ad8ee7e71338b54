//! Retry delay policy.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Exponential backoff: the k-th retry waits `base * 2^(k-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay before the attempt that follows the `retry_count`-th failure.
    ///
    /// `retry_count` is 1-based; 0 is treated as 1. Saturates instead of
    /// overflowing for absurd retry counts.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    /// Wall-clock time of the next attempt after the `retry_count`-th failure.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        let delay = TimeDelta::from_std(self.delay_for(retry_count)).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
