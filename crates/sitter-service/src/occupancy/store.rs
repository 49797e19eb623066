//! Occupancy store: in-memory group map with write-through snapshots.
//!
//! # Locking
//!
//! - One async lock per group serialises read-modify-write operations on
//!   that group. Different groups never wait on each other.
//! - The group map itself sits behind a short-lived sync lock that is never
//!   held across an `.await`.
//! - The map only ever holds saved state. A mutation builds the next snapshot
//!   from the map plus its own group's entry, saves it under the persist lock,
//!   and writes the entry into the map only once the save succeeds. A pending
//!   change of one group never reaches disk through another group's save.
//! - A group's lock entry is dropped once its last guard goes away.
//!
//! Lock order is group lock, then persist lock, then the broadcast
//! scheduler's registry. Nothing acquires them in reverse.

use crate::errors::{SitterError, StoreError};
use crate::occupancy::record::GroupState;
use async_trait::async_trait;
use common::types::GroupId;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, instrument, warn};

/// Full persisted state: one entry per group with a claim or stored config.
pub type Snapshot = BTreeMap<GroupId, GroupState>;

/// Durable snapshot storage.
///
/// `save` must replace the previous snapshot atomically: a crash mid-save
/// leaves the last committed snapshot readable.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed snapshot (empty when nothing was saved yet).
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replace the committed snapshot.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// JSON file implementation of [`SnapshotStore`].
///
/// Writes go to `<path>.tmp` and are renamed over `<path>`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the committed snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "sitter.store", "No snapshot on disk, starting empty");
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            error!(target: "sitter.store", error = %e, "Snapshot on disk is not valid JSON");
            StoreError::Corrupt(e.to_string())
        })
    }

    #[instrument(skip_all, fields(path = %self.path.display(), groups = snapshot.len()))]
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(target: "sitter.store", bytes = bytes.len(), "Snapshot saved");
        Ok(())
    }
}

type GroupLocks = Arc<Mutex<HashMap<GroupId, Arc<tokio::sync::Mutex<()>>>>>;

/// Proof that the caller holds a group's critical section.
pub struct GroupGuard {
    group: GroupId,
    locks: GroupLocks,
    guard: OwnedMutexGuard<()>,
}

impl GroupGuard {
    /// The group this guard locks.
    pub fn group(&self) -> GroupId {
        self.group
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        // Map entry plus this guard: nobody else holds or waits on the lock.
        let mut locks = lock_or_recover(&self.locks);
        let mine = OwnedMutexGuard::mutex(&self.guard);
        if locks
            .get(&self.group)
            .is_some_and(|lock| Arc::ptr_eq(lock, mine) && Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.group);
        }
    }
}

/// Process-wide occupancy state, mutated only through
/// [`OccupancyService`](crate::occupancy::OccupancyService).
pub struct OccupancyStore {
    snapshots: Arc<dyn SnapshotStore>,
    /// Saved state; written only under `persist_lock` after a successful save.
    groups: Mutex<Snapshot>,
    group_locks: GroupLocks,
    persist_lock: tokio::sync::Mutex<()>,
}

impl OccupancyStore {
    /// Load the committed snapshot and build the store around it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the snapshot cannot be read or parsed.
    pub async fn load(snapshots: Arc<dyn SnapshotStore>) -> Result<Self, StoreError> {
        let initial = snapshots.load().await?;
        info!(target: "sitter.store", groups = initial.len(), "Occupancy state loaded");
        Ok(Self::with_state(snapshots, initial))
    }

    /// Build the store around an already loaded snapshot.
    pub fn with_state(snapshots: Arc<dyn SnapshotStore>, initial: Snapshot) -> Self {
        Self {
            snapshots,
            groups: Mutex::new(initial),
            group_locks: Arc::new(Mutex::new(HashMap::new())),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Enter the critical section for `group`.
    pub async fn lock_group(&self, group: GroupId) -> GroupGuard {
        let lock = {
            let mut locks = lock_or_recover(&self.group_locks);
            Arc::clone(locks.entry(group).or_default())
        };
        GroupGuard {
            group,
            locks: Arc::clone(&self.group_locks),
            guard: lock.lock_owned().await,
        }
    }

    /// Current state of a group.
    pub fn get(&self, group: GroupId) -> Option<GroupState> {
        lock_or_recover(&self.groups).get(&group).cloned()
    }

    /// Copy of every group's state.
    pub fn snapshot(&self) -> Snapshot {
        lock_or_recover(&self.groups).clone()
    }

    /// Apply `f` to the guarded group's entry and persist the result.
    ///
    /// `f` receives the entry as an `Option` so it can create or remove it.
    /// The new entry becomes visible only after it is saved. When the save
    /// fails nothing changes and `StoreUnavailable` is returned; the caller
    /// sees either a committed change or no change.
    pub async fn mutate<R>(
        &self,
        guard: &GroupGuard,
        f: impl FnOnce(&mut Option<GroupState>) -> R,
    ) -> Result<R, SitterError> {
        let group = guard.group();
        let mut entry = self.get(group);
        let result = f(&mut entry);

        if let Err(e) = self.persist(group, entry).await {
            warn!(
                target: "sitter.store",
                group_id = %group,
                error = %e,
                "Snapshot save failed, group state left unchanged"
            );
            return Err(e.into());
        }

        Ok(result)
    }

    /// Save the committed state with `group` replaced by `entry`, then
    /// publish the entry.
    async fn persist(&self, group: GroupId, entry: Option<GroupState>) -> Result<(), StoreError> {
        let _persist = self.persist_lock.lock().await;

        let mut next = self.snapshot();
        match &entry {
            Some(state) => next.insert(group, state.clone()),
            None => next.remove(&group),
        };
        self.snapshots.save(&next).await?;

        let mut groups = lock_or_recover(&self.groups);
        match entry {
            Some(state) => groups.insert(group, state),
            None => groups.remove(&group),
        };
        Ok(())
    }
}

/// A poisoned map only means another thread panicked mid-update of plain
/// data; the map itself is still usable.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::occupancy::record::UpdateSettings;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Minimal in-memory store with a failure switch.
    #[derive(Default)]
    struct FlakyStore {
        saved: Mutex<Option<Snapshot>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SnapshotStore for FlakyStore {
        async fn load(&self) -> Result<Snapshot, StoreError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }

        async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            *self.saved.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }
    }

    /// Saves wait on a gate and reject any snapshot that contains `rejected`.
    struct GatedStore {
        saved: Mutex<Snapshot>,
        gate: tokio::sync::Semaphore,
        rejected: GroupId,
    }

    impl GatedStore {
        fn closed(rejected: GroupId) -> Self {
            Self {
                saved: Mutex::new(Snapshot::new()),
                gate: tokio::sync::Semaphore::new(0),
                rejected,
            }
        }
    }

    #[async_trait]
    impl SnapshotStore for GatedStore {
        async fn load(&self) -> Result<Snapshot, StoreError> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
            let _permit = self.gate.acquire().await.unwrap();
            if snapshot.contains_key(&self.rejected) {
                return Err(StoreError::Unavailable("rejected".to_string()));
            }
            *self.saved.lock().unwrap() = snapshot.clone();
            Ok(())
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn config_only(interval: u32) -> GroupState {
        GroupState {
            claim: None,
            updates: UpdateSettings::disabled(interval),
        }
    }

    #[tokio::test]
    async fn test_mutate_persists_snapshot() {
        let backing = Arc::new(FlakyStore::default());
        let store = OccupancyStore::load(backing.clone()).await.unwrap();

        let guard = store.lock_group(GroupId(1)).await;
        store
            .mutate(&guard, |entry| *entry = Some(config_only(15)))
            .await
            .unwrap();

        let saved = backing.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.get(&GroupId(1)), Some(&config_only(15)));
        assert_eq!(store.get(GroupId(1)), Some(config_only(15)));
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let backing = Arc::new(FlakyStore::default());
        let store = OccupancyStore::load(backing.clone()).await.unwrap();

        let guard = store.lock_group(GroupId(1)).await;
        store
            .mutate(&guard, |entry| *entry = Some(config_only(15)))
            .await
            .unwrap();

        backing.fail.store(true, Ordering::SeqCst);
        let result = store.mutate(&guard, |entry| *entry = None).await;

        assert!(matches!(result, Err(SitterError::StoreUnavailable(_))));
        assert_eq!(store.get(GroupId(1)), Some(config_only(15)));
    }

    #[tokio::test]
    async fn test_failed_save_never_reaches_disk_through_another_group() {
        let backing = Arc::new(GatedStore::closed(GroupId(2)));
        let store = Arc::new(OccupancyStore::with_state(backing.clone(), Snapshot::new()));

        let write = |group: u64| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let guard = store.lock_group(GroupId(group)).await;
                store
                    .mutate(&guard, |entry| *entry = Some(config_only(15)))
                    .await
            })
        };

        // Group 3 holds the persist lock while its save waits on the gate
        let third = write(3);
        settle().await;
        let first = write(1);
        let second = write(2);
        settle().await;

        // Pending writes are not visible before they are saved
        assert_eq!(store.get(GroupId(1)), None);
        assert_eq!(store.get(GroupId(2)), None);

        backing.gate.add_permits(1);
        assert!(third.await.unwrap().is_ok());
        assert!(first.await.unwrap().is_ok());
        assert!(matches!(
            second.await.unwrap(),
            Err(SitterError::StoreUnavailable(_))
        ));

        let on_disk = backing.saved.lock().unwrap().clone();
        assert!(!on_disk.contains_key(&GroupId(2)));
        assert_eq!(
            on_disk.keys().copied().collect::<Vec<_>>(),
            vec![GroupId(1), GroupId(3)]
        );
        assert_eq!(store.get(GroupId(2)), None);
        assert_eq!(store.snapshot(), on_disk);
    }

    #[tokio::test]
    async fn test_group_lock_entry_dropped_after_last_guard() {
        let store = Arc::new(OccupancyStore::with_state(
            Arc::new(FlakyStore::default()),
            Snapshot::new(),
        ));

        let held = store.lock_group(GroupId(1)).await;
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let _guard = store.lock_group(GroupId(1)).await;
            })
        };
        settle().await;

        // The waiter still needs the same lock
        drop(held);
        assert!(store.group_locks.lock().unwrap().contains_key(&GroupId(1)));

        waiter.await.unwrap();
        assert!(store.group_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_locks_are_independent() {
        let store = OccupancyStore::with_state(Arc::new(FlakyStore::default()), Snapshot::new());

        let _held = store.lock_group(GroupId(1)).await;
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            store.lock_group(GroupId(2)),
        )
        .await;
        assert!(other.is_ok(), "Different groups must not block each other");

        let same = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            store.lock_group(GroupId(1)),
        )
        .await;
        assert!(same.is_err(), "Same group must wait for the holder");
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

        assert!(store.load().await.unwrap().is_empty());

        let mut snapshot = Snapshot::new();
        snapshot.insert(GroupId(42), config_only(30));
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.load().await.unwrap(), snapshot);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = JsonFileStore::new(&path).load().await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
        // The corrupt file is left untouched for inspection.
        assert_eq!(std::fs::read(&path).unwrap(), b"{not json");
    }
}
