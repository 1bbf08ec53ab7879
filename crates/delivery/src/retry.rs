//! Backoff schedule for failed deliveries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exponential backoff without a cap: `delay(a) = (2^a - 1) * unit`.
///
/// With the default one-minute unit this gives 0, 1, 3, 7, 15... minutes.
/// Arithmetic saturates at the numeric limit instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_millis(60_000),
        }
    }
}

impl RetryPolicy {
    pub fn with_unit(unit: Duration) -> Self {
        Self { unit }
    }

    /// Delay before the next attempt after `attempts` failed attempts.
    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempts)
            .map(|p| p - 1)
            .unwrap_or(u64::MAX);
        let unit_ms = u64::try_from(self.unit.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(factor.saturating_mul(unit_ms))
    }

    /// `now + delay(attempts)`, clamped to the latest representable instant.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay(attempts))
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
