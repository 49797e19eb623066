//! Message rendering.
//!
//! Pure functions from state and an instant to the text a transport shows.
//! Mentions use Discord syntax (`<@user>`, `<#channel>`); times are rendered
//! in server time via [`ServerTime`].

use crate::clock::{human_duration, ServerTime};
use crate::occupancy::record::{Claim, UpdateSettings};
use chrono::{DateTime, Utc};
use common::types::{ChannelId, UserId};
use rand::seq::SliceRandom;

/// Quips appended when updates are configured with nobody holding the account.
pub const VACANT_QUIPS: [&str; 4] = [
    "👻 No sitter on deck. The fields are quiet. Type `/on` to claim.",
    "🌾 Nobody’s in the account—lists won’t click themselves. Use `/on`.",
    "🕳️ Empty throne. Take the helm with `/on`.",
    "🕰️ Silence in the granary. Who’s up? `/on` to start the shift.",
];

/// Renders occupancy messages in one server time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRenderer {
    time: ServerTime,
}

impl MessageRenderer {
    #[must_use]
    pub fn new(time: ServerTime) -> Self {
        Self { time }
    }

    #[must_use]
    pub fn server_time(&self) -> ServerTime {
        self.time
    }

    /// Two-line status of a held group.
    ///
    /// ```text
    /// <@1> **ON** — **farming** — note
    /// Server time: **09:00** → **09:30** UTC−1 — **12m** elapsed.
    /// ```
    ///
    /// The range ends at the planned end when there is one, otherwise at
    /// `now`. A planned end already in the past is flagged.
    #[must_use]
    pub fn status_line(&self, claim: &Claim, now: DateTime<Utc>) -> String {
        let end = claim.until().unwrap_or(now);
        let (from, to) = self.time.span(claim.since, end);

        let mut range = format!(
            "Server time: **{from}** → **{to}** {}",
            self.time.label()
        );
        if claim.planned_end_passed(now) {
            range.push_str(" (planned end passed)");
        }

        format!(
            "{} **ON** — **{}**{}\n{range} — **{}** elapsed.",
            mention(claim.holder),
            claim.activity,
            note_suffix(claim.note.as_deref()),
            human_duration(claim.elapsed_seconds(now)),
        )
    }

    /// Reply to a status query: the status line plus the auto-update settings.
    ///
    /// `fallback_target` is shown when no broadcast target was ever set.
    #[must_use]
    pub fn status_report(
        &self,
        claim: &Claim,
        updates: &UpdateSettings,
        fallback_target: ChannelId,
        now: DateTime<Utc>,
    ) -> String {
        format!(
            "🟢 {}\nAuto-updates: **{}** (every **{}m**, ping **{}**) → {}",
            self.status_line(claim, now),
            on_off(updates.enabled),
            updates.interval_minutes,
            updates.ping.label(),
            channel(updates.target.unwrap_or(fallback_target)),
        )
    }

    /// Reply to a status query on a vacant group.
    #[must_use]
    pub fn empty_status(&self) -> String {
        "No one is ON.".to_string()
    }

    /// One recurring broadcast.
    #[must_use]
    pub fn auto_update(
        &self,
        claim: &Claim,
        updates: &UpdateSettings,
        now: DateTime<Utc>,
    ) -> String {
        let prefix = if updates.ping.wide_attention() {
            "@here "
        } else {
            ""
        };
        format!("{prefix}⏱️ Auto-update: {}", self.status_line(claim, now))
    }

    /// Announcement posted when a claim succeeds.
    #[must_use]
    pub fn claim_announcement(&self, claim: &Claim) -> String {
        let mut extras = Vec::new();
        if let Some(note) = claim.note.as_deref() {
            extras.push(note.to_string());
        }
        if let (Some(minutes), Some(until)) = (claim.planned_minutes, claim.until()) {
            extras.push(format!(
                "for {minutes}m (→ {} {})",
                self.time.hhmm(until),
                self.time.label()
            ));
        }
        let suffix = if extras.is_empty() {
            String::new()
        } else {
            format!(" — {}", extras.join(" | "))
        };

        format!(
            "🟢 {} is **ON** acc — **{}**{suffix}\nServer time: **{}** {} start",
            mention(claim.holder),
            claim.activity,
            self.time.hhmm(claim.since),
            self.time.label(),
        )
    }

    /// Summary posted when the holder releases.
    #[must_use]
    pub fn release_summary(&self, claim: &Claim, now: DateTime<Utc>) -> String {
        let (from, to) = self.time.span(claim.since, now);
        format!(
            "⚪ {} is **OFF**.\nServer time: **{from}** → **{to}** {} — **{}**",
            mention(claim.holder),
            self.time.label(),
            human_duration(claim.elapsed_seconds(now)),
        )
    }

    /// Acknowledgement of an updates change while someone holds the group.
    #[must_use]
    pub fn updates_applied(&self, updates: &UpdateSettings) -> String {
        match (updates.enabled, updates.target) {
            (true, Some(target)) => format!(
                "✅ Auto-updates **ON** every **{}m** in {} (ping **{}**).",
                updates.interval_minutes,
                channel(target),
                updates.ping.label(),
            ),
            _ => "✅ Auto-updates **OFF**.".to_string(),
        }
    }

    /// Acknowledgement of an updates change on a vacant group, with a quip.
    #[must_use]
    pub fn updates_armed_without_holder(&self, updates: &UpdateSettings) -> String {
        let quip = VACANT_QUIPS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default();
        let target = updates
            .target
            .map_or_else(String::new, |target| format!(" → {}", channel(target)));
        format!(
            "✅ Auto-updates **{}** (every **{}m**, ping {}){target}\n{quip}",
            if updates.enabled { "armed" } else { "off" },
            updates.interval_minutes,
            updates.ping.label(),
        )
    }

    /// Acknowledgement of an admin clear.
    #[must_use]
    pub fn cleared(&self) -> String {
        "✅ Cleared current ON sitter.".to_string()
    }
}

fn mention(user: UserId) -> String {
    format!("<@{user}>")
}

fn channel(target: ChannelId) -> String {
    format!("<#{target}>")
}

fn note_suffix(note: Option<&str>) -> String {
    note.map_or_else(String::new, |note| format!(" — {note}"))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}
