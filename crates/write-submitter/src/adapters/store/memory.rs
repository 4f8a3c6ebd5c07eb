use crate::domain::StoreError;
use crate::ports::outbound::{PendingWriteStore, StoredBlob, StoredEntry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory pending-write store for unit tests and ephemeral sessions.
///
/// Writes and reads can be made to fail to simulate an unavailable device
/// store. Production uses `FileBackedPendingStore`.
#[derive(Default)]
pub struct InMemoryPendingStore {
    entries: Mutex<HashMap<String, StoredBlob>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryPendingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `save` and `remove` fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `load` and `list` fail with an I/O error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Overwrite raw bytes under `key`, bypassing any encoding.
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>, cached_at: u64) {
        self.entries
            .lock()
            .insert(key.to_string(), StoredBlob { bytes, cached_at });
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io("store unavailable for reads".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("store unavailable for writes".to_string()));
        }
        Ok(())
    }
}

impl PendingWriteStore for InMemoryPendingStore {
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        self.check_reads()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, blob: StoredBlob) -> Result<(), StoreError> {
        self.check_writes()?;
        self.entries.lock().insert(key.to_string(), blob);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.check_writes()?;
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn list(&self) -> Result<Vec<StoredEntry>, StoreError> {
        self.check_reads()?;
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(key, blob)| StoredEntry {
                key: key.clone(),
                cached_at: blob.cached_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(byte: u8, cached_at: u64) -> StoredBlob {
        StoredBlob {
            bytes: vec![byte; 4],
            cached_at,
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryPendingStore::new();

        store.save("pending/a", blob(1, 10)).unwrap();
        store.save("pending/b", blob(2, 20)).unwrap();

        assert_eq!(store.load("pending/a").unwrap(), Some(blob(1, 10)));
        assert_eq!(store.load("pending/c").unwrap(), None);
        assert_eq!(store.list().unwrap().len(), 2);

        assert!(store.remove("pending/a").unwrap());
        assert!(!store.remove("pending/a").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_replaces() {
        let store = InMemoryPendingStore::new();
        store.save("k", blob(1, 10)).unwrap();
        store.save("k", blob(2, 20)).unwrap();
        assert_eq!(store.load("k").unwrap(), Some(blob(2, 20)));
    }

    #[test]
    fn test_failure_injection() {
        let store = InMemoryPendingStore::new();
        store.set_fail_writes(true);
        assert!(matches!(store.save("k", blob(1, 1)), Err(StoreError::Io(_))));
        assert!(store.is_empty());

        store.set_fail_writes(false);
        store.save("k", blob(1, 1)).unwrap();
        store.set_fail_reads(true);
        assert!(store.load("k").is_err());
        assert!(store.list().is_err());
    }
}
