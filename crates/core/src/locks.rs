//! Advisory locks keyed on (owner, file).
//!
//! Upload sessions addressing the same stored file are serialized; sessions for different
//! files never contend. Entries are created on first use and dropped from the table when
//! the last session holding or waiting on them goes away.

use dashmap::DashMap;
use filestore_files::StorageId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (StorageId, StorageId);
type LockTable = DashMap<LockKey, Arc<Mutex<()>>>;

#[derive(Clone, Debug, Default)]
pub struct SessionLocks {
    table: Arc<LockTable>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other session holds the lock for (`owner_id`, `file_id`).
    ///
    /// Dropping the returned future while it waits leaves the table as if it was never
    /// called.
    pub async fn acquire(&self, owner_id: &StorageId, file_id: &StorageId) -> SessionGuard {
        let key = (owner_id.clone(), file_id.clone());
        let cleanup = EntryCleanup {
            key: key.clone(),
            table: Arc::clone(&self.table),
        };
        let guard = {
            let mutex = self.table.entry(key).or_default().value().clone();
            mutex.lock_owned().await
        };

        SessionGuard {
            _guard: guard,
            _cleanup: cleanup,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Held for the lifetime of one upload session.
///
/// Fields drop in order: the mutex is released before the table entry is reconsidered.
#[derive(Debug)]
pub struct SessionGuard {
    _guard: OwnedMutexGuard<()>,
    _cleanup: EntryCleanup,
}

/// Drops a key's table entry once nothing holds or waits on its mutex.
#[derive(Debug)]
struct EntryCleanup {
    key: LockKey,
    table: Arc<LockTable>,
}

impl Drop for EntryCleanup {
    fn drop(&mut self) {
        // Only the table's own reference left means nobody is waiting.
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
