//! The cache engine: resolves URI → key → path, coordinates locks, calls
//! the fetcher on a miss, serves hits, and hands out scoped read handles.

mod handle;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fs_err as fs;
use parking_lot::Mutex;

pub use handle::{ReadHandle, TempReadHandle};

use crate::error::CacheError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::fingerprint::key_of;
use crate::layout::Layout;
use crate::lock::{LockGuard, LockMode};
use crate::purge::PurgeReport;

/// A content-addressed, cross-process-safe local cache for remote objects.
///
/// A `Cache` is a cheap, cloneable handle over (root path, size bound); all
/// durable state lives on disk, so any number of `Cache` values — in this
/// process or any other — can point at the same root and observe each
/// other's writes through the lock protocol alone.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

struct Inner {
    layout: Layout,
    max_size: u64,
    fetcher: Box<dyn Fetcher>,
    /// Intra-process accelerator: lets threads sharing this handle queue on
    /// an in-memory mutex instead of each separately racing the OS lock for
    /// a cold key. Never load-bearing — the per-entry file lock is always
    /// still acquired and honored regardless of this map's state.
    entry_guards: DashMap<String, Arc<Mutex<()>>>,
    staging_counter: AtomicU64,
}

struct EnsureOutcome {
    payload: PathBuf,
    /// The exclusive per-entry lock, still held. `ensure()` lets this drop
    /// at the end of its own scope; `open()` downgrades it to shared
    /// in place so the entry is never observably unlocked in between.
    entry_lock: LockGuard,
}

impl Cache {
    /// Constructs a cache rooted at `root`, using the default HTTP/file
    /// fetcher and a size bound of [`crate::consts::DEFAULT_MAX_SIZE`].
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::with_fetcher(root, crate::consts::DEFAULT_MAX_SIZE, HttpFetcher::new())
    }

    /// Constructs a cache rooted at `root` with an explicit size bound and
    /// fetcher. A `max_size` of `0` marks the cache "ephemeral": wrapping
    /// it in [`crate::EphemeralCache`] purges everything on scope exit.
    pub fn with_fetcher(
        root: impl Into<PathBuf>,
        max_size: u64,
        fetcher: impl Fetcher + 'static,
    ) -> Result<Self, CacheError> {
        let layout = Layout::new(root);
        layout.init()?;
        Ok(Self {
            inner: Arc::new(Inner {
                layout,
                max_size,
                fetcher: Box::new(fetcher),
                entry_guards: DashMap::new(),
                staging_counter: AtomicU64::new(0),
            }),
        })
    }

    /// The configured size bound, in bytes.
    pub fn max_size(&self) -> u64 {
        self.inner.max_size
    }

    fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    /// Ensures the object at `uri` is present in the cache, fetching it on
    /// a miss, and returns the path to its payload file.
    ///
    /// For N concurrent callers with the same cold `uri`, exactly one
    /// performs the fetch; the others block on the per-entry exclusive
    /// lock and observe the payload already installed once they acquire
    /// it.
    pub fn ensure(&self, uri: &str) -> Result<PathBuf, CacheError> {
        Ok(self.ensure_locked(uri)?.payload)
    }

    fn ensure_locked(&self, uri: &str) -> Result<EnsureOutcome, CacheError> {
        let key = key_of(uri);
        let payload = self.layout().payload_path(&key);
        let entry_lock_path = self.layout().lock_path(&key);

        let intra_process_guard = self
            .inner
            .entry_guards
            .entry(key.clone())
            .or_default()
            .clone();
        let _intra_process_guard = intra_process_guard.lock();

        // Held only for the duration of this call: guarantees a concurrent
        // purge never observes a partially written payload and never
        // deletes an entry whose producer is mid-fetch.
        let _purge_shared = LockGuard::acquire_blocking(
            &self.layout().purge_lock_file,
            LockMode::Shared,
        )?;

        let entry_lock = LockGuard::acquire_blocking(&entry_lock_path, LockMode::Exclusive)?;

        if payload.exists() {
            touch(&payload)?;
            return Ok(EnsureOutcome { payload, entry_lock });
        }

        let staging = self.unique_staging_path(&key);
        tracing::debug!(uri, key = %key, "fetching into cache");
        if let Err(source) = self.inner.fetcher.fetch(uri, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(CacheError::FetchFailed {
                uri: uri.to_string(),
                source,
            });
        }

        fs::rename(&staging, &payload).map_err(|e| CacheError::io(&payload, e))?;
        tracing::debug!(uri, key = %key, "installed cache entry");
        Ok(EnsureOutcome { payload, entry_lock })
    }

    fn unique_staging_path(&self, key: &str) -> PathBuf {
        let counter = self.inner.staging_counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{key}.{}.{counter}", std::process::id());
        self.layout().cache_dir.join(name)
    }

    /// Ensures `uri` is present, then returns a scoped read handle holding
    /// a shared per-entry lock for as long as the handle is alive. While
    /// any shared lock is held, the purger cannot evict that entry.
    pub fn open(&self, uri: &str) -> Result<ReadHandle, CacheError> {
        let outcome = self.ensure_locked(uri)?;
        let shared = outcome.entry_lock.downgrade_to_shared()?;
        Ok(ReadHandle::new(outcome.payload, shared))
    }

    /// Ensures `uri` is present, then copies its payload to `destination`.
    /// A shared per-entry lock is held for the duration of the copy (and
    /// not a moment longer) so a concurrent purge cannot evict the entry
    /// out from under `fs::copy`.
    pub fn copy_to(&self, uri: &str, destination: impl AsRef<Path>) -> Result<(), CacheError> {
        let outcome = self.ensure_locked(uri)?;
        let _shared = outcome.entry_lock.downgrade_to_shared()?;
        fs::copy(&outcome.payload, destination.as_ref())
            .map_err(|e| CacheError::io(destination.as_ref(), e))?;
        Ok(())
    }

    /// Like [`Cache::copy_to`], but the destination is a freshly created
    /// temporary file owned by the returned handle and deleted when it is
    /// dropped. As in `copy_to`, a shared per-entry lock is held across
    /// the copy itself and released immediately after.
    ///
    /// The temp file is deliberately created in the system temp directory
    /// rather than under `cache/`: the purger's scan treats every file it
    /// finds there as an eviction candidate, and this handle outlives the
    /// lock held during the copy, so a copy left inside `cache/` could be
    /// swept by a later purge.
    pub fn extract_temp(&self, uri: &str) -> Result<TempReadHandle, CacheError> {
        let outcome = self.ensure_locked(uri)?;
        let _shared = outcome.entry_lock.downgrade_to_shared()?;
        let temp = tempfile::NamedTempFile::new().map_err(|e| CacheError::io(std::env::temp_dir(), e))?;
        fs::copy(&outcome.payload, temp.path()).map_err(|e| CacheError::io(temp.path(), e))?;
        Ok(TempReadHandle::new(temp))
    }

    /// Removes entries until total payload size is at most `max_size` and
    /// no remaining entry is older than `max_age`, subject to the
    /// per-entry lock discipline in [`crate::purge`]. Purely advisory: if
    /// the whole-cache lock is currently held elsewhere this returns
    /// immediately with an empty report rather than blocking.
    pub fn purge(
        &self,
        max_size: Option<u64>,
        max_age: Option<std::time::Duration>,
    ) -> Result<PurgeReport, CacheError> {
        crate::purge::run(
            self.layout(),
            max_size.unwrap_or(self.inner.max_size),
            max_age.unwrap_or(crate::consts::DEFAULT_MAX_AGE),
        )
    }
}

fn touch(payload: &Path) -> Result<(), CacheError> {
    let now = filetime::FileTime::now();
    filetime::set_file_mtime(payload, now).map_err(|e| CacheError::io(payload, e))
}
