//! Clock and server-time formatting.
//!
//! All instants are whole-second UTC timestamps. Rendering converts them to
//! the fixed server offset (UTC−1 by default) and labels them accordingly.

use chrono::{DateTime, FixedOffset, Offset, SubsecRound, Utc};

/// Source of the current instant.
///
/// The production clock reads the system time; tests drive a manual clock so
/// rendered times and elapsed durations are deterministic.
pub trait Clock: Send + Sync {
    /// Current instant, truncated to whole seconds.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// Formats instants in the fixed server time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTime {
    offset: FixedOffset,
}

impl ServerTime {
    /// Server time at `minutes` east of UTC. Returns `None` outside ±24h.
    #[must_use]
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    /// The fixed offset used for rendering.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Converts an instant to server time.
    #[must_use]
    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    /// `HH:MM` in server time.
    #[must_use]
    pub fn hhmm(&self, instant: DateTime<Utc>) -> String {
        self.local(instant).format("%H:%M").to_string()
    }

    /// `YYYY-MM-DD HH:MM` in server time.
    #[must_use]
    pub fn date_hhmm(&self, instant: DateTime<Utc>) -> String {
        self.local(instant).format("%Y-%m-%d %H:%M").to_string()
    }

    /// Whether both instants fall on the same server-time calendar day.
    #[must_use]
    pub fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.local(a).date_naive() == self.local(b).date_naive()
    }

    /// Formats `start` and `end` as a pair: time only when both are on the
    /// same server day, date and time otherwise.
    #[must_use]
    pub fn span(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> (String, String) {
        if self.same_day(start, end) {
            (self.hhmm(start), self.hhmm(end))
        } else {
            (self.date_hhmm(start), self.date_hhmm(end))
        }
    }

    /// Zone label such as `UTC−1`, `UTC+5:30` or `UTC`.
    #[must_use]
    pub fn label(&self) -> String {
        let total = self.offset.local_minus_utc() / 60;
        if total == 0 {
            return "UTC".to_string();
        }
        // U+2212 MINUS SIGN, matching how the server advertises its zone.
        let sign = if total < 0 { '\u{2212}' } else { '+' };
        let hours = total.abs() / 60;
        let minutes = total.abs() % 60;
        if minutes == 0 {
            format!("UTC{sign}{hours}")
        } else {
            format!("UTC{sign}{hours}:{minutes:02}")
        }
    }
}

impl Default for ServerTime {
    fn default() -> Self {
        Self {
            offset: FixedOffset::west_opt(3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Human-readable duration: `1h02m`, `2m` or `45s`.
///
/// Negative inputs render as `0s`.
#[must_use]
pub fn human_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (minutes, secs) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}
