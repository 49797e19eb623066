//! Sitter Service Library
//!
//! Tracks which single user currently holds a shared game account in each
//! group, and optionally posts recurring status broadcasts while the
//! account is held.
//!
//! # Architecture
//!
//! ```text
//! OccupancyService (claim / query / release / configure / clear)
//! ├── OccupancyStore (per-group locks, write-through snapshots)
//! │   └── SnapshotStore (JsonFileStore in production)
//! └── BroadcastScheduler (root CancellationToken)
//!     └── broadcast task (at most one per group)
//!         ├── MessageRenderer
//!         └── Delivery (DiscordDelivery in production)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with stable codes and client messages
//! - [`clock`] - Current instant and server-time formatting
//! - [`render`] - User-facing message text
//! - [`occupancy`] - Data model, store and state machine
//! - [`broadcast`] - Recurring broadcast tasks
//! - [`delivery`] - Message delivery collaborator
//!
//! Command registration is left to the transport embedding this library;
//! it resolves a [`occupancy::CallerContext`] and calls
//! [`occupancy::OccupancyService`].

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod occupancy;
pub mod render;
