//! `BroadcastScheduler` - registry of per-group broadcast tasks.
//!
//! # Task lifecycle
//!
//! - `start` cancels any live task for the group, then spawns a new one
//!   (replace, never stack).
//! - `stop` cancels and deregisters; stopping a group without a task is a
//!   no-op. Neither call waits for the task to finish.
//! - A task ends on its own when the group loses its holder, updates are
//!   disabled, or the target becomes unreachable. It removes its own
//!   registry entry unless a newer task has already replaced it.
//!
//! # Tick policy
//!
//! | Delivery result | Task |
//! |-----------------|------|
//! | delivered | keeps running |
//! | failed / timed out | logged, keeps running |
//! | target unreachable | persists `enabled = false`, stops |

use crate::clock::Clock;
use crate::config::IntervalPolicy;
use crate::delivery::Delivery;
use crate::errors::DeliveryError;
use crate::occupancy::store::OccupancyStore;
use crate::render::MessageRenderer;
use common::types::{ChannelId, GroupId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

/// When a freshly started task sends its first broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    /// Broadcast right away, then every interval.
    Immediate,
    /// Wait one interval first (used when resuming after a restart).
    AfterInterval,
}

/// Result of one broadcast tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Delivered,
    /// Delivery failed or timed out; swallowed.
    DeliveryFailed,
    /// No holder, no record, or updates disabled.
    NoLongerWanted,
    /// Target missing or unreachable; updates were disabled.
    TargetUnreachable,
}

impl TickOutcome {
    /// Whether the task should sleep and tick again.
    #[must_use]
    pub fn keeps_running(self) -> bool {
        matches!(self, TickOutcome::Delivered | TickOutcome::DeliveryFailed)
    }
}

/// Everything a broadcast task needs, shared by all tasks.
#[derive(Clone)]
pub struct BroadcastContext {
    pub store: Arc<OccupancyStore>,
    pub delivery: Arc<dyn Delivery>,
    pub clock: Arc<dyn Clock>,
    pub renderer: MessageRenderer,
    pub intervals: IntervalPolicy,
    /// Bound on one delivery call; expiry counts as a failed delivery.
    pub delivery_timeout: Duration,
}

impl BroadcastContext {
    /// Render and deliver one broadcast for `group`.
    #[instrument(skip_all, fields(group_id = %group))]
    pub async fn tick(&self, group: GroupId) -> TickOutcome {
        let Some(state) = self.store.get(group) else {
            return TickOutcome::NoLongerWanted;
        };
        let Some(claim) = state.claim.as_ref().filter(|_| state.updates.enabled) else {
            return TickOutcome::NoLongerWanted;
        };
        let Some(target) = state.updates.target else {
            self.disable_unreachable(group, None).await;
            return TickOutcome::TargetUnreachable;
        };

        let text = self
            .renderer
            .auto_update(claim, &state.updates, self.clock.now());
        let wide_attention = state.updates.ping.wide_attention();

        let delivery = tokio::time::timeout(
            self.delivery_timeout,
            self.delivery.deliver(target, &text, wide_attention),
        )
        .await;

        match delivery {
            Ok(Ok(())) => {
                debug!(
                    target: "sitter.broadcast",
                    group_id = %group,
                    channel_id = %target,
                    "Broadcast delivered"
                );
                TickOutcome::Delivered
            }
            Ok(Err(DeliveryError::Unreachable(reason))) => {
                warn!(
                    target: "sitter.broadcast",
                    group_id = %group,
                    channel_id = %target,
                    reason = %reason,
                    "Broadcast target unreachable, disabling updates"
                );
                self.disable_unreachable(group, Some(target)).await;
                TickOutcome::TargetUnreachable
            }
            Ok(Err(DeliveryError::Failed(reason))) => {
                warn!(
                    target: "sitter.broadcast",
                    group_id = %group,
                    channel_id = %target,
                    reason = %reason,
                    "Broadcast delivery failed, will retry next interval"
                );
                TickOutcome::DeliveryFailed
            }
            Err(_) => {
                warn!(
                    target: "sitter.broadcast",
                    group_id = %group,
                    channel_id = %target,
                    timeout_ms = self.delivery_timeout.as_millis(),
                    "Broadcast delivery timed out, will retry next interval"
                );
                TickOutcome::DeliveryFailed
            }
        }
    }

    /// Sleep before the next tick, read fresh from the store.
    fn current_interval(&self, group: GroupId) -> Option<Duration> {
        self.store
            .get(group)
            .map(|state| self.intervals.sleep_for(state.updates.interval_minutes))
    }

    /// Persist `enabled = false` if the group still targets `target`.
    async fn disable_unreachable(&self, group: GroupId, target: Option<ChannelId>) {
        let guard = self.store.lock_group(group).await;
        let still_current = self
            .store
            .get(group)
            .is_some_and(|state| state.updates.enabled && state.updates.target == target);
        if !still_current {
            return;
        }

        let result = self
            .store
            .mutate(&guard, |entry| {
                if let Some(state) = entry {
                    state.updates.enabled = false;
                }
            })
            .await;
        if let Err(e) = result {
            warn!(
                target: "sitter.broadcast",
                group_id = %group,
                error = %e,
                "Failed to persist disabled updates"
            );
        }
    }
}

struct BroadcastTask {
    generation: u64,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<GroupId, BroadcastTask>>>;

/// Owns at most one live broadcast task per group.
pub struct BroadcastScheduler {
    ctx: BroadcastContext,
    tasks: Registry,
    next_generation: AtomicU64,
    root_token: CancellationToken,
}

impl BroadcastScheduler {
    #[must_use]
    pub fn new(ctx: BroadcastContext) -> Self {
        Self {
            ctx,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            root_token: CancellationToken::new(),
        }
    }

    /// Shared task context.
    pub fn context(&self) -> &BroadcastContext {
        &self.ctx
    }

    /// Start (or restart) the broadcast task for `group`.
    pub fn start(&self, group: GroupId, first_tick: FirstTick) {
        if self.root_token.is_cancelled() {
            debug!(
                target: "sitter.broadcast",
                group_id = %group,
                "Scheduler shut down, not starting broadcast task"
            );
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.root_token.child_token();

        let mut tasks = lock_registry(&self.tasks);
        if let Some(previous) = tasks.remove(&group) {
            previous.cancel_token.cancel();
            debug!(
                target: "sitter.broadcast",
                group_id = %group,
                replaced_generation = previous.generation,
                "Cancelled previous broadcast task"
            );
        }

        let handle = tokio::spawn(
            run_broadcast_loop(
                self.ctx.clone(),
                group,
                generation,
                cancel_token.clone(),
                Arc::clone(&self.tasks),
                first_tick,
            )
            .instrument(tracing::info_span!(
                "broadcast_task",
                group_id = %group,
                generation
            )),
        );

        tasks.insert(
            group,
            BroadcastTask {
                generation,
                cancel_token,
                handle,
            },
        );

        info!(
            target: "sitter.broadcast",
            group_id = %group,
            generation,
            first_tick = ?first_tick,
            "Broadcast task started"
        );
    }

    /// Cancel and deregister the task for `group`. Returns whether one existed.
    pub fn stop(&self, group: GroupId) -> bool {
        let Some(task) = lock_registry(&self.tasks).remove(&group) else {
            return false;
        };
        task.cancel_token.cancel();
        info!(
            target: "sitter.broadcast",
            group_id = %group,
            generation = task.generation,
            "Broadcast task stopped"
        );
        true
    }

    /// Whether a live task is registered for `group`.
    pub fn is_running(&self, group: GroupId) -> bool {
        lock_registry(&self.tasks)
            .get(&group)
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Groups with a registered task.
    pub fn active_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = lock_registry(&self.tasks).keys().copied().collect();
        groups.sort_unstable();
        groups
    }

    /// Cancel every task and wait up to `deadline` for them to finish.
    pub async fn shutdown(&self, deadline: Duration) {
        self.root_token.cancel();
        let tasks: Vec<(GroupId, BroadcastTask)> = lock_registry(&self.tasks).drain().collect();
        info!(
            target: "sitter.broadcast",
            tasks = tasks.len(),
            "Shutting down broadcast tasks"
        );

        let deadline = tokio::time::Instant::now() + deadline;
        for (group, task) in tasks {
            if tokio::time::timeout_at(deadline, task.handle).await.is_err() {
                warn!(
                    target: "sitter.broadcast",
                    group_id = %group,
                    "Broadcast task did not stop before the shutdown deadline"
                );
            }
        }
    }
}

impl Drop for BroadcastScheduler {
    fn drop(&mut self) {
        self.root_token.cancel();
    }
}

async fn run_broadcast_loop(
    ctx: BroadcastContext,
    group: GroupId,
    generation: u64,
    cancel_token: CancellationToken,
    registry: Registry,
    first_tick: FirstTick,
) {
    let mut wait_first = first_tick == FirstTick::AfterInterval;

    loop {
        if wait_first {
            let Some(interval) = ctx.current_interval(group) else {
                break;
            };
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        wait_first = true;

        let outcome = tokio::select! {
            biased;
            () = cancel_token.cancelled() => break,
            outcome = ctx.tick(group) => outcome,
        };

        if !outcome.keeps_running() {
            info!(
                target: "sitter.broadcast",
                group_id = %group,
                outcome = ?outcome,
                "Broadcast task ending"
            );
            break;
        }
    }

    let mut tasks = lock_registry(&registry);
    if tasks
        .get(&group)
        .is_some_and(|task| task.generation == generation)
    {
        tasks.remove(&group);
    }
}

fn lock_registry(
    registry: &Mutex<HashMap<GroupId, BroadcastTask>>,
) -> MutexGuard<'_, HashMap<GroupId, BroadcastTask>> {
    registry
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
