//! Caller fixtures and a fully wired service over the mocks.

use crate::{ManualClock, MemorySnapshotStore, MockDelivery};
use common::types::{ChannelId, GroupId, UserId};
use sitter_service::broadcast::{BroadcastContext, BroadcastScheduler};
use sitter_service::config::IntervalPolicy;
use sitter_service::occupancy::{CallerContext, OccupancyService, OccupancyStore, Snapshot};
use sitter_service::render::MessageRenderer;
use std::sync::Arc;
use std::time::Duration;

pub const ALICE: UserId = UserId(1001);
pub const BOB: UserId = UserId(1002);
pub const CAROL: UserId = UserId(1003);

/// Delivery timeout used by [`TestHarness`].
pub const TEST_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Caller `user` in group `group`, speaking from channel `channel`.
#[must_use]
pub fn caller(group: u64, user: UserId, channel: u64) -> CallerContext {
    CallerContext {
        group: GroupId(group),
        caller: user,
        channel: ChannelId(channel),
    }
}

/// `minutes` as a tokio duration.
#[must_use]
pub fn minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes * 60)
}

/// Let spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused tokio time, then let woken tasks run.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Occupancy service wired to in-memory mocks.
pub struct TestHarness {
    pub service: OccupancyService,
    pub scheduler: Arc<BroadcastScheduler>,
    pub store: Arc<OccupancyStore>,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub delivery: Arc<MockDelivery>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Empty state, default intervals (60m default, 5m floor).
    #[must_use]
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::new())
    }

    /// Start from a previously committed snapshot.
    #[must_use]
    pub fn with_snapshot(initial: Snapshot) -> Self {
        let snapshots = Arc::new(MemorySnapshotStore::with_snapshot(initial.clone()));
        let store = Arc::new(OccupancyStore::with_state(snapshots.clone(), initial));
        let delivery = Arc::new(MockDelivery::new());
        let clock = Arc::new(ManualClock::default());

        let scheduler = Arc::new(BroadcastScheduler::new(BroadcastContext {
            store: Arc::clone(&store),
            delivery: delivery.clone(),
            clock: clock.clone(),
            renderer: MessageRenderer::default(),
            intervals: IntervalPolicy::default(),
            delivery_timeout: TEST_DELIVERY_TIMEOUT,
        }));
        let service = OccupancyService::new(Arc::clone(&scheduler));

        Self {
            service,
            scheduler,
            store,
            snapshots,
            delivery,
            clock,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
