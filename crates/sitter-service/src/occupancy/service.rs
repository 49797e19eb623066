//! Occupancy state machine.
//!
//! Every mutating operation runs inside the group's critical section:
//!
//! 1. Lock the group
//! 2. Validate against the current state (exclusivity, holder check)
//! 3. Mutate and persist (nothing changes if the save fails)
//! 4. Start or stop the group's broadcast task
//!
//! Step 4 only runs after a successful save, and always while the group lock
//! is still held, so two racing operations cannot leave the scheduler out of
//! step with the stored state.

use crate::broadcast::{BroadcastScheduler, FirstTick};
use crate::clock::Clock;
use crate::config::IntervalPolicy;
use crate::errors::SitterError;
use crate::occupancy::record::{Activity, Claim, GroupState, PingMode, UpdateSettings};
use crate::occupancy::store::OccupancyStore;
use crate::render::MessageRenderer;
use common::types::{ChannelId, GroupId, UserId};
use std::sync::Arc;
use tracing::{info, instrument};

/// Who is calling, and from where.
///
/// Resolved by the transport before any operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub group: GroupId,
    pub caller: UserId,
    /// Channel the command was issued in; becomes the broadcast target.
    pub channel: ChannelId,
}

/// Successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub claim: Claim,
    /// Whether a broadcast task was started for the claim.
    pub broadcasting: bool,
    pub message: String,
}

/// What a status query found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    Occupied {
        claim: Claim,
        updates: UpdateSettings,
        elapsed_seconds: i64,
        /// Informational only; a claim never expires on its own.
        planned_end_passed: bool,
    },
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub occupancy: Occupancy,
    pub message: String,
}

/// Successful release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReceipt {
    pub claim: Claim,
    pub message: String,
}

/// Result of configuring auto-updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatesOutcome {
    /// A holder is present; the broadcast task follows `updates.enabled`.
    Applied {
        updates: UpdateSettings,
        message: String,
    },
    /// Nobody holds the group; the settings wait for the next claim.
    NoHolderYet {
        updates: UpdateSettings,
        message: String,
    },
}

impl UpdatesOutcome {
    /// Settings as stored.
    #[must_use]
    pub fn updates(&self) -> &UpdateSettings {
        match self {
            UpdatesOutcome::Applied { updates, .. }
            | UpdatesOutcome::NoHolderYet { updates, .. } => updates,
        }
    }

    /// Text for the caller.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            UpdatesOutcome::Applied { message, .. }
            | UpdatesOutcome::NoHolderYet { message, .. } => message,
        }
    }
}

/// Result of an admin clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleared {
    /// State that was removed, if any.
    pub previous: Option<GroupState>,
    pub message: String,
}

/// Claim, query, release, configure and clear per group.
pub struct OccupancyService {
    store: Arc<OccupancyStore>,
    scheduler: Arc<BroadcastScheduler>,
    clock: Arc<dyn Clock>,
    renderer: MessageRenderer,
    intervals: IntervalPolicy,
}

impl OccupancyService {
    /// Build the service around the scheduler's shared context.
    #[must_use]
    pub fn new(scheduler: Arc<BroadcastScheduler>) -> Self {
        let ctx = scheduler.context();
        let store = Arc::clone(&ctx.store);
        let clock = Arc::clone(&ctx.clock);
        let renderer = ctx.renderer;
        let intervals = ctx.intervals;
        Self {
            store,
            scheduler,
            clock,
            renderer,
            intervals,
        }
    }

    pub fn store(&self) -> &Arc<OccupancyStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<BroadcastScheduler> {
        &self.scheduler
    }

    /// Take the group for the caller.
    ///
    /// Stored update settings carry over; the target moves to the caller's
    /// channel. With updates enabled a broadcast task starts and ticks
    /// immediately.
    ///
    /// # Errors
    ///
    /// - `SitterError::Conflict` - the group is already held, by anyone
    ///   (including the caller)
    /// - `SitterError::StoreUnavailable` - the snapshot could not be saved
    #[instrument(skip_all, fields(group_id = %ctx.group, user_id = %ctx.caller, activity = %activity))]
    pub async fn claim(
        &self,
        ctx: &CallerContext,
        activity: Activity,
        note: Option<String>,
        planned_minutes: Option<u32>,
    ) -> Result<ClaimReceipt, SitterError> {
        let guard = self.store.lock_group(ctx.group).await;

        let current = self.store.get(ctx.group);
        if let Some(holder) = current
            .as_ref()
            .and_then(|state| state.claim.as_ref())
            .map(|claim| claim.holder)
        {
            info!(
                target: "sitter.occupancy",
                group_id = %ctx.group,
                user_id = %ctx.caller,
                holder_id = %holder,
                "Claim rejected, group already held"
            );
            return Err(SitterError::Conflict { holder });
        }

        let claim = Claim::new(ctx.caller, activity, note, self.clock.now(), planned_minutes);
        let mut updates = current
            .map(|state| state.updates)
            .unwrap_or_else(|| UpdateSettings::disabled(self.intervals.default_minutes));
        updates.target = Some(ctx.channel);

        let state = GroupState {
            claim: Some(claim.clone()),
            updates,
        };
        let broadcasting = state.wants_broadcasts();
        self.store
            .mutate(&guard, |entry| *entry = Some(state))
            .await?;

        if broadcasting {
            self.scheduler.start(ctx.group, FirstTick::Immediate);
        }

        info!(
            target: "sitter.occupancy",
            group_id = %ctx.group,
            user_id = %ctx.caller,
            planned_minutes = ?claim.planned_minutes,
            broadcasting,
            "Group claimed"
        );

        Ok(ClaimReceipt {
            message: self.renderer.claim_announcement(&claim),
            claim,
            broadcasting,
        })
    }

    /// Current occupancy of the caller's group. Never mutates.
    #[instrument(skip_all, fields(group_id = %ctx.group))]
    pub fn query(&self, ctx: &CallerContext) -> StatusReport {
        let now = self.clock.now();
        let Some((claim, updates)) = self
            .store
            .get(ctx.group)
            .and_then(|state| state.claim.map(|claim| (claim, state.updates)))
        else {
            return StatusReport {
                occupancy: Occupancy::Empty,
                message: self.renderer.empty_status(),
            };
        };

        let message = self.renderer.status_report(&claim, &updates, ctx.channel, now);
        StatusReport {
            occupancy: Occupancy::Occupied {
                elapsed_seconds: claim.elapsed_seconds(now),
                planned_end_passed: claim.planned_end_passed(now),
                claim,
                updates,
            },
            message,
        }
    }

    /// Give the group up. Removes the claim and the update settings.
    ///
    /// # Errors
    ///
    /// - `SitterError::NotHolder` - nobody holds the group, or someone else does
    /// - `SitterError::StoreUnavailable` - the snapshot could not be saved
    #[instrument(skip_all, fields(group_id = %ctx.group, user_id = %ctx.caller))]
    pub async fn release(&self, ctx: &CallerContext) -> Result<ReleaseReceipt, SitterError> {
        let guard = self.store.lock_group(ctx.group).await;

        let Some(claim) = self
            .store
            .get(ctx.group)
            .and_then(|state| state.claim)
            .filter(|claim| claim.holder == ctx.caller)
        else {
            info!(
                target: "sitter.occupancy",
                group_id = %ctx.group,
                user_id = %ctx.caller,
                "Release rejected, caller is not the holder"
            );
            return Err(SitterError::NotHolder);
        };

        self.store.mutate(&guard, |entry| *entry = None).await?;
        self.scheduler.stop(ctx.group);

        let now = self.clock.now();
        info!(
            target: "sitter.occupancy",
            group_id = %ctx.group,
            user_id = %ctx.caller,
            elapsed_seconds = claim.elapsed_seconds(now),
            "Group released"
        );

        Ok(ReleaseReceipt {
            message: self.renderer.release_summary(&claim, now),
            claim,
        })
    }

    /// Store auto-update settings for the group, held or not.
    ///
    /// `interval_minutes` is applied only when positive and is clamped to
    /// the floor; `ping` is applied only when given. The target becomes the
    /// caller's channel.
    ///
    /// # Errors
    ///
    /// Returns `SitterError::StoreUnavailable` if the snapshot could not be
    /// saved.
    #[instrument(skip_all, fields(group_id = %ctx.group, enabled = enabled))]
    pub async fn configure_updates(
        &self,
        ctx: &CallerContext,
        enabled: bool,
        interval_minutes: Option<u32>,
        ping: Option<PingMode>,
    ) -> Result<UpdatesOutcome, SitterError> {
        let guard = self.store.lock_group(ctx.group).await;

        let mut state = self.store.get(ctx.group).unwrap_or_else(|| GroupState {
            claim: None,
            updates: UpdateSettings::disabled(self.intervals.default_minutes),
        });
        if let Some(minutes) = interval_minutes.filter(|m| *m > 0) {
            state.updates.interval_minutes = self.intervals.clamp(minutes);
        }
        if let Some(ping) = ping {
            state.updates.ping = ping;
        }
        state.updates.enabled = enabled;
        state.updates.target = Some(ctx.channel);

        let held = state.claim.is_some();
        let updates = state.updates.clone();
        self.store
            .mutate(&guard, |entry| *entry = Some(state))
            .await?;

        info!(
            target: "sitter.occupancy",
            group_id = %ctx.group,
            user_id = %ctx.caller,
            enabled,
            interval_minutes = updates.interval_minutes,
            ping = updates.ping.label(),
            held,
            "Auto-updates configured"
        );

        if !held {
            self.scheduler.stop(ctx.group);
            return Ok(UpdatesOutcome::NoHolderYet {
                message: self.renderer.updates_armed_without_holder(&updates),
                updates,
            });
        }

        if enabled {
            self.scheduler.start(ctx.group, FirstTick::Immediate);
        } else {
            self.scheduler.stop(ctx.group);
        }

        Ok(UpdatesOutcome::Applied {
            message: self.renderer.updates_applied(&updates),
            updates,
        })
    }

    /// Remove the group's claim and settings unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `SitterError::StoreUnavailable` if the snapshot could not be
    /// saved.
    #[instrument(skip_all, fields(group_id = %group))]
    pub async fn admin_clear(&self, group: GroupId) -> Result<Cleared, SitterError> {
        let guard = self.store.lock_group(group).await;

        let previous = self.store.get(group);
        if previous.is_some() {
            self.store.mutate(&guard, |entry| *entry = None).await?;
        }
        self.scheduler.stop(group);

        info!(
            target: "sitter.occupancy",
            group_id = %group,
            had_state = previous.is_some(),
            "Group cleared"
        );

        Ok(Cleared {
            previous,
            message: self.renderer.cleared(),
        })
    }

    /// Start broadcast tasks for every held group with updates enabled.
    ///
    /// Resumed tasks wait one interval before their first broadcast.
    /// Returns the number of tasks started.
    pub async fn resume_broadcasts(&self) -> usize {
        let mut resumed = 0;
        for group in self.store.snapshot().into_keys() {
            let _guard = self.store.lock_group(group).await;
            if self
                .store
                .get(group)
                .is_some_and(|state| state.wants_broadcasts())
            {
                self.scheduler.start(group, FirstTick::AfterInterval);
                resumed += 1;
            }
        }

        info!(
            target: "sitter.occupancy",
            resumed,
            "Broadcast tasks resumed"
        );
        resumed
    }
}
