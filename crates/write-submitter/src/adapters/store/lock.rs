//! Exclusive cross-process lock on a pending-write file.
//!
//! Two processes rewriting the same file would silently drop each other's
//! entries, so the file store refuses to open while another process holds it.

use crate::domain::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lock held for the lifetime of a `FileBackedPendingStore`. Released on drop.
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Lock `<store_path>.lock`, failing at once if another process holds it.
    pub fn acquire(store_path: &Path) -> Result<Self, StoreError> {
        let path = store_path.with_extension("lock");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        if file.try_lock_exclusive().is_err() {
            let holder = std::fs::read_to_string(&path).unwrap_or_default();
            let holder = holder.trim();
            return Err(StoreError::Locked(if holder.is_empty() {
                path.display().to_string()
            } else {
                format!("{} (pid {})", path.display(), holder)
            }));
        }

        // PID is informational only
        file.set_len(0).map_err(|e| StoreError::Io(e.to_string()))?;
        write!(file, "{}", std::process::id()).map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("pending.bin");

        let lock = StoreLock::acquire(&store_path).unwrap();
        assert!(lock.path().exists());
        assert!(matches!(
            StoreLock::acquire(&store_path),
            Err(StoreError::Locked(msg)) if msg.contains("pid")
        ));

        drop(lock);
        assert!(StoreLock::acquire(&store_path).is_ok());
    }
}
