use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a sidecar file, held for the lifetime of a
/// metadata store handle.
///
/// The lock is per open file description, so a second handle in the same
/// process conflicts just like another process would. The kernel drops it
/// when the holder dies.
#[derive(Debug)]
pub struct StoreLock {
    lock_file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Take the lock if nobody holds it, `None` otherwise.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        let file = open_lock_file(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                path: lock_path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, reporting an unlock failure instead of ignoring it.
    pub fn release(self) -> Result<(), StoreError> {
        // The unlock repeated by Drop on an unlocked file is a no-op.
        self.lock_file.unlock()?;
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}
