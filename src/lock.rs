//! Advisory file locks with two distinct scopes: per-entry and whole-cache.
//!
//! Both scopes are backed by the same [`LockGuard`] primitive, which wraps a
//! `std::fs::File` opened on a sentinel path and an OS advisory lock
//! (`flock`/equivalent, via [`fs4`]) taken on that file. The guard's `Drop`
//! releases the lock unconditionally, so every exit path (normal return,
//! early `?`, panic unwind) releases it; a crashed process releases its
//! locks via the OS without any cooperation from this code.
//!
//! Lock ordering invariant: when a single process holds both scopes, the
//! whole-cache lock must be acquired before any per-entry lock. Callers
//! holding an exclusive per-entry lock must never attempt to acquire the
//! whole-cache lock afterwards (the cache engine itself never does).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::error::CacheError;

/// The mode a [`LockGuard`] was acquired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// An RAII guard over an advisory file lock. Dropping it releases the lock.
pub struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

impl LockGuard {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires a lock on `path`, blocking until it is available.
    pub fn acquire_blocking(path: &Path, mode: LockMode) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;
        tracing::debug!(path = %path.display(), ?mode, "blocking on lock");
        let result = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        result.map_err(|e| CacheError::io(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    /// Attempts to acquire a lock on `path` without blocking. Returns
    /// `Err(CacheError::LockBusy)` if another holder is incompatible.
    pub fn try_acquire(path: &Path, mode: LockMode) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;
        let result = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        match result {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
                mode,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(CacheError::LockBusy),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Converts an exclusive guard into a shared one by re-locking the
    /// *same* open file description in shared mode, rather than releasing
    /// and reacquiring. `flock`-family locks allow a holder to convert its
    /// own lock's mode in place, so there is no instant at which the path
    /// is unlocked (see SPEC_FULL.md §9, "Resolved open question").
    pub fn downgrade_to_shared(mut self) -> Result<Self, CacheError> {
        debug_assert_eq!(self.mode, LockMode::Exclusive);
        FileExt::lock_shared(&self.file).map_err(|e| CacheError::io(&self.path, e))?;
        self.mode = LockMode::Shared;
        Ok(self)
    }
}

fn open_lock_file(path: &Path) -> Result<File, CacheError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| CacheError::io(path, e))
}

/// Scope factory for the per-entry lock at `lock/<key>`.
pub fn entry_lock_path(lock_dir: &Path, key: &str) -> PathBuf {
    lock_dir.join(key)
}

/// Scope factory for the whole-cache lock at `cache.lock`.
pub fn purge_lock_path(purge_lock_file: &Path) -> PathBuf {
    purge_lock_file.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn exclusive_lock_excludes_non_blocking_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.lock");
        let _guard = LockGuard::acquire_blocking(&path, LockMode::Exclusive).unwrap();
        let second = LockGuard::try_acquire(&path, LockMode::Exclusive);
        assert!(matches!(second, Err(CacheError::LockBusy)));
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.lock");
        let first = LockGuard::acquire_blocking(&path, LockMode::Shared).unwrap();
        let second = LockGuard::try_acquire(&path, LockMode::Shared);
        assert!(second.is_ok());
        drop(first);
    }

    #[test]
    fn shared_lock_excludes_non_blocking_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.lock");
        let _shared = LockGuard::acquire_blocking(&path, LockMode::Shared).unwrap();
        let exclusive = LockGuard::try_acquire(&path, LockMode::Exclusive);
        assert!(matches!(exclusive, Err(CacheError::LockBusy)));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.lock");
        {
            let _guard = LockGuard::acquire_blocking(&path, LockMode::Exclusive).unwrap();
        }
        let second = LockGuard::try_acquire(&path, LockMode::Exclusive);
        assert!(second.is_ok());
    }

    #[test]
    fn blocking_acquire_waits_for_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.lock");
        let guard = LockGuard::acquire_blocking(&path, LockMode::Exclusive).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let handle = thread::spawn(move || {
            let _g = LockGuard::acquire_blocking(&waiter_path, LockMode::Exclusive).unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn downgrade_keeps_entry_continuously_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.lock");
        let exclusive = LockGuard::acquire_blocking(&path, LockMode::Exclusive).unwrap();
        let shared = exclusive.downgrade_to_shared().unwrap();
        assert_eq!(shared.mode(), LockMode::Shared);
        // The downgraded guard still excludes a concurrent exclusive attempt.
        assert!(LockGuard::try_acquire(&path, LockMode::Exclusive).is_err());
        // But a second shared holder is admitted, as expected after a downgrade.
        let other_shared = LockGuard::try_acquire(&path, LockMode::Shared);
        assert!(other_shared.is_ok());
        drop(shared);
        drop(other_shared);
        assert!(LockGuard::try_acquire(&path, LockMode::Exclusive).is_ok());
    }
}
