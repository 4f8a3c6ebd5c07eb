//! Per-operation async locks.
//!
//! Calls for the same operation id serialize for the whole
//! check-cache → sign → persist → broadcast → confirm sequence. Map entries
//! are dropped once the last holder or waiter releases them.

use crate::domain::OperationId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock plus the number of callers holding or waiting for it.
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type LockMap = HashMap<OperationId, Slot>;

/// Registry of per-operation locks.
#[derive(Default)]
pub struct OperationLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl OperationLocks {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `operation_id`.
    ///
    /// Dropping the returned future while it waits releases the map entry.
    pub async fn acquire(&self, operation_id: OperationId) -> OperationGuard {
        let lock = {
            let mut locks = self.locks.lock();
            let slot = locks.entry(operation_id).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        let entry = LockEntry {
            operation_id,
            locks: Arc::clone(&self.locks),
        };

        let guard = lock.lock_owned().await;
        OperationGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// True while someone holds or waits for `operation_id`.
    pub fn is_held(&self, operation_id: &OperationId) -> bool {
        self.locks.lock().contains_key(operation_id)
    }

    /// Number of live lock entries.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// True when no lock entries exist.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Exclusive access to one operation id. Released on drop.
pub struct OperationGuard {
    // Fields drop in order: the mutex is released before the entry check
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry,
}

/// One holder's or waiter's claim on a map entry.
struct LockEntry {
    operation_id: OperationId,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for LockEntry {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        if let Some(slot) = locks.get_mut(&self.operation_id) {
            slot.users -= 1;
            if slot.users == 0 {
                locks.remove(&self.operation_id);
            }
        }
    }
}
