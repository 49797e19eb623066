//! Recurring status broadcasts.
//!
//! One cancellable task per group posts the current occupancy line to the
//! group's target on the configured interval.
//!
//! ```text
//! BroadcastScheduler (one per process, owns the root CancellationToken)
//! └── broadcast task (at most one per group, child token)
//!     ├── re-reads group state every tick
//!     ├── renders + delivers (bounded by the delivery timeout)
//!     └── sleeps for the interval read on that tick
//! ```

pub mod scheduler;

pub use scheduler::{BroadcastContext, BroadcastScheduler, FirstTick, TickOutcome};
