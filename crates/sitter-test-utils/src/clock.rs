//! Manually advanced clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sitter_service::clock::Clock;
use std::sync::Mutex;

/// Clock whose instant only moves when a test says so.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock starting at `start`.
    #[must_use]
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }

    /// Move forward by `seconds`.
    pub fn advance_secs(&self, seconds: i64) {
        *self.now.lock().unwrap() += Duration::seconds(seconds);
    }

    /// Move forward by `minutes`.
    pub fn advance_mins(&self, minutes: i64) {
        self.advance_secs(minutes * 60);
    }
}

impl Default for ManualClock {
    /// 2024-06-01 10:00:00 UTC (09:00 server time).
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
