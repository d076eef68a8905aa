//! Scoped read handles returned by [`super::Cache::open`] and
//! [`super::Cache::extract_temp`].

use std::path::{Path, PathBuf};

use crate::lock::LockGuard;

/// A handle onto a cache entry's payload, held open under a shared
/// per-entry lock for as long as the handle is alive. While any
/// `ReadHandle` exists for a key, the purger's non-blocking exclusive
/// lock attempt on that key fails and the entry is skipped.
pub struct ReadHandle {
    payload: PathBuf,
    _lock: LockGuard,
}

impl ReadHandle {
    pub(crate) fn new(payload: PathBuf, lock: LockGuard) -> Self {
        Self {
            payload,
            _lock: lock,
        }
    }

    /// The path to the cached payload. Valid for the lifetime of this
    /// handle; the purger cannot remove it while the handle is alive.
    pub fn path(&self) -> &Path {
        &self.payload
    }
}

/// A private, caller-owned copy of a cache entry's payload. Unlike
/// [`ReadHandle`], this does not hold any cache lock — the copy is made
/// and the entry lock released before this type is constructed, so the
/// file it owns is fully independent of the cache's lifetime and
/// eviction policy.
pub struct TempReadHandle {
    temp: tempfile::NamedTempFile,
}

impl TempReadHandle {
    pub(crate) fn new(temp: tempfile::NamedTempFile) -> Self {
        Self { temp }
    }

    /// The path to the private temporary copy. Removed when this handle
    /// is dropped.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}
