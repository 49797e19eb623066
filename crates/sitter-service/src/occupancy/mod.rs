//! Per-group occupancy: who holds the shared account, and the auto-update
//! settings that outlive individual claims.
//!
//! - [`record`] - persisted data model
//! - [`store`] - in-memory map with per-group locks and write-through snapshots
//! - [`service`] - the claim / query / release / configure / clear operations

pub mod record;
pub mod service;
pub mod store;

pub use record::{Activity, Claim, GroupState, PingMode, UpdateSettings};
pub use service::{
    CallerContext, ClaimReceipt, Cleared, Occupancy, OccupancyService, ReleaseReceipt,
    StatusReport, UpdatesOutcome,
};
pub use store::{JsonFileStore, OccupancyStore, Snapshot, SnapshotStore};
