use super::lock::StoreLock;
use crate::domain::{StoreError, Timestamp};
use crate::ports::outbound::{PendingWriteStore, StoredBlob, StoredEntry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-backed pending-write store.
///
/// Keeps all entries in memory and rewrites the whole file on every change,
/// via a synced temp file renamed over the original. The entry count is
/// bounded by the submitter's cap, so the file stays small.
///
/// Record format: `[key_len:u32][key][cached_at:u64][value_len:u32][value]...`
///
/// Only one process may open a given file at a time.
pub struct FileBackedPendingStore {
    entries: Mutex<HashMap<String, StoredBlob>>,
    path: PathBuf,
    _lock: StoreLock,
}

impl FileBackedPendingStore {
    /// Open the store at `path`, loading any existing entries.
    ///
    /// A missing file is an empty store. A truncated tail is dropped with a
    /// warning; records before it are kept.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let lock = StoreLock::acquire(&path)?;

        let entries = match std::fs::File::open(&path) {
            Ok(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)
                    .map_err(|e| StoreError::Io(e.to_string()))?;
                let entries = Self::parse(&bytes, &path);
                info!(
                    "[pw-submitter] 💾 Loaded {} pending writes from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[pw-submitter] 📁 No pending-write file at {}", path.display());
                HashMap::new()
            }
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        Ok(Self {
            entries: Mutex::new(entries),
            path,
            _lock: lock,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(bytes: &[u8], path: &Path) -> HashMap<String, StoredBlob> {
        let mut entries = HashMap::new();
        let mut cursor = 0;

        while cursor < bytes.len() {
            match Self::parse_record(bytes, cursor) {
                Some((key, blob, next)) => {
                    entries.insert(key, blob);
                    cursor = next;
                }
                None => {
                    warn!(
                        "[pw-submitter] ⚠️ Dropping {} unreadable trailing bytes in {}",
                        bytes.len() - cursor,
                        path.display()
                    );
                    break;
                }
            }
        }

        entries
    }

    fn parse_record(bytes: &[u8], mut cursor: usize) -> Option<(String, StoredBlob, usize)> {
        let key_len = read_u32(bytes, cursor)? as usize;
        cursor += 4;
        let key = std::str::from_utf8(bytes.get(cursor..cursor + key_len)?).ok()?;
        cursor += key_len;

        let cached_at = read_u64(bytes, cursor)?;
        cursor += 8;

        let value_len = read_u32(bytes, cursor)? as usize;
        cursor += 4;
        let value = bytes.get(cursor..cursor + value_len)?.to_vec();
        cursor += value_len;

        Some((
            key.to_string(),
            StoredBlob {
                bytes: value,
                cached_at,
            },
            cursor,
        ))
    }

    fn write_file(&self, entries: &HashMap<String, StoredBlob>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();

        let mut bytes = Vec::new();
        for key in keys {
            let blob = &entries[key];
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key.as_bytes());
            bytes.extend_from_slice(&blob.cached_at.to_le_bytes());
            bytes.extend_from_slice(&(blob.bytes.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&blob.bytes);
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file =
            std::fs::File::create(&temp_path).map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&bytes)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| StoreError::Io(e.to_string()))?;

        std::fs::rename(&temp_path, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<Timestamp> {
    Some(u64::from_le_bytes(bytes.get(at..at + 8)?.try_into().ok()?))
}

impl PendingWriteStore for FileBackedPendingStore {
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, blob: StoredBlob) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), blob);
        if let Err(e) = self.write_file(&entries) {
            // Memory must not claim durability the disk doesn't have
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let Some(previous) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.write_file(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn list(&self) -> Result<Vec<StoredEntry>, StoreError> {
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
