//! Persisted per-group occupancy state.
//!
//! A group entry carries two independent parts: the active [`Claim`] (present
//! only while someone holds the account) and the [`UpdateSettings`] that
//! outlive individual claims until a release or admin clear wipes them.

use chrono::{DateTime, Duration, Utc};
use common::types::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the holder is doing on the shared account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Farming,
    Building,
    Raiding,
    Defending,
    Scouting,
    Market,
    Other,
}

impl Activity {
    /// Every activity, in menu order.
    pub const ALL: [Activity; 7] = [
        Activity::Farming,
        Activity::Building,
        Activity::Raiding,
        Activity::Defending,
        Activity::Scouting,
        Activity::Market,
        Activity::Other,
    ];

    /// Lowercase label shown to users.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Activity::Farming => "farming",
            Activity::Building => "building",
            Activity::Raiding => "raiding",
            Activity::Defending => "defending",
            Activity::Scouting => "scouting",
            Activity::Market => "market",
            Activity::Other => "other",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error for an activity name outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown activity: {0}")]
pub struct UnknownActivity(pub String);

impl FromStr for Activity {
    type Err = UnknownActivity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Activity::ALL
            .into_iter()
            .find(|activity| activity.label() == wanted)
            .ok_or_else(|| UnknownActivity(s.to_string()))
    }
}

/// Whether broadcasts ask the target to notify everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingMode {
    #[default]
    None,
    /// Prefix broadcasts with `@here` and allow wide mentions.
    Here,
}

impl PingMode {
    /// Whether deliveries should request wide attention.
    #[must_use]
    pub fn wide_attention(self) -> bool {
        matches!(self, PingMode::Here)
    }

    /// Upper-case label used in acknowledgements (`HERE` / `OFF`).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            PingMode::None => "OFF",
            PingMode::Here => "HERE",
        }
    }
}

/// The active holder of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub holder: UserId,
    pub activity: Activity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Claim start; set once at claim time and never changed while held.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub since: DateTime<Utc>,
    /// Planned duration in minutes. `None` means open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_minutes: Option<u32>,
}

impl Claim {
    /// Builds a claim, normalising an empty note and a zero duration to
    /// `None`.
    #[must_use]
    pub fn new(
        holder: UserId,
        activity: Activity,
        note: Option<String>,
        since: DateTime<Utc>,
        planned_minutes: Option<u32>,
    ) -> Self {
        Self {
            holder,
            activity,
            note: note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            since,
            planned_minutes: planned_minutes.filter(|m| *m > 0),
        }
    }

    /// Planned end, when a duration was given.
    #[must_use]
    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.planned_minutes
            .map(|minutes| self.since + Duration::minutes(i64::from(minutes)))
    }

    /// Whole seconds since the claim started (never negative).
    #[must_use]
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.since).num_seconds().max(0)
    }

    /// Whether a planned end exists and lies strictly before `now`.
    #[must_use]
    pub fn planned_end_passed(&self, now: DateTime<Utc>) -> bool {
        self.until().is_some_and(|until| until < now)
    }
}

/// Recurring broadcast configuration for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub enabled: bool,
    /// Minutes between broadcasts (already clamped to the floor).
    pub interval_minutes: u32,
    #[serde(default)]
    pub ping: PingMode,
    /// Channel for the claim announcement and broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ChannelId>,
}

impl UpdateSettings {
    /// Disabled settings with the given interval and no target.
    #[must_use]
    pub fn disabled(interval_minutes: u32) -> Self {
        Self {
            enabled: false,
            interval_minutes,
            ping: PingMode::None,
            target: None,
        }
    }
}

/// Everything persisted for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,
    pub updates: UpdateSettings,
}

impl GroupState {
    /// Whether a broadcast task should be running for this group.
    #[must_use]
    pub fn wants_broadcasts(&self) -> bool {
        self.claim.is_some() && self.updates.enabled
    }
}
