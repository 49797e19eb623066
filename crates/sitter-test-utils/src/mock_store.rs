//! In-memory snapshot store.

use async_trait::async_trait;
use sitter_service::errors::StoreError;
use sitter_service::occupancy::{Snapshot, SnapshotStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// [`SnapshotStore`] kept in memory, with a switch that makes saves fail.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    committed: Mutex<Snapshot>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose committed snapshot starts as `initial`.
    #[must_use]
    pub fn with_snapshot(initial: Snapshot) -> Self {
        Self {
            committed: Mutex::new(initial),
            ..Self::default()
        }
    }

    /// Make every following save fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last committed snapshot.
    pub fn committed(&self) -> Snapshot {
        self.committed.lock().unwrap().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.committed())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated save failure".to_string()));
        }
        *self.committed.lock().unwrap() = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
