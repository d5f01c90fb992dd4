//! The `[start, end)` interval that defines "recent" activity for one run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Default lookback: the previous 24 hours.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Whether `ts` falls inside the window (start inclusive, end exclusive).
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Compute the window ending at `now` and reaching back `lookback`.
///
/// `lookback` must be positive; configuration loading enforces this.
#[must_use]
pub fn compute_window(now: DateTime<Utc>, lookback: Duration) -> TimeWindow {
    debug_assert!(lookback > Duration::zero(), "lookback must be positive");
    TimeWindow {
        start: now - lookback,
        end: now,
    }
}
