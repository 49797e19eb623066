//! # Sitter Test Utilities
//!
//! Mocks and fixtures for exercising the Sitter service without Discord or
//! a real state file.
//!
//! ## Modules
//!
//! - `mock_delivery` - Recording delivery collaborator with scripted failures
//! - `mock_store` - In-memory snapshot store with a failure switch
//! - `clock` - Manually advanced clock
//! - `fixtures` - Caller contexts and a fully wired test service
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sitter_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let alice = caller(1, ALICE, 10);
//!
//!     harness.service.claim(&alice, Activity::Farming, None, None).await.unwrap();
//!     assert_eq!(harness.delivery.delivery_count(), 0);
//! }
//! ```

pub mod clock;
pub mod fixtures;
pub mod mock_delivery;
pub mod mock_store;

pub use clock::ManualClock;
pub use fixtures::*;
pub use mock_delivery::{MockDelivery, RecordedDelivery};
pub use mock_store::MemorySnapshotStore;
