//! A content-addressed local cache for remote object-store artifacts,
//! shared safely across processes on one host via advisory file locks.
//!
//! See [`Cache`] for the main entry point.

mod cache;
mod config;
mod consts;
mod error;
mod fetch;
mod fingerprint;
mod layout;
mod lock;
mod purge;

pub use cache::{Cache, ReadHandle, TempReadHandle};
pub use config::{CacheConfig, ConfigError};
pub use consts::{DEFAULT_MAX_AGE, DEFAULT_MAX_SIZE};
pub use error::{CacheError, FetchError};
pub use fetch::{Fetcher, HttpFetcher};
pub use fingerprint::key_of;
pub use purge::PurgeReport;

/// Wraps a [`Cache`] constructed with a size bound of zero ("ephemeral")
/// so that it is fully purged when the wrapper goes out of scope.
/// Entering the scope is a no-op; leaving it is a no-op for any cache
/// *not* constructed as ephemeral.
///
/// ```no_run
/// # use download_cache::{Cache, EphemeralCache, HttpFetcher};
/// # fn run() -> Result<(), download_cache::CacheError> {
/// let cache = Cache::with_fetcher("/tmp/scratch-cache", 0, HttpFetcher::new())?;
/// let scope = EphemeralCache::new(cache);
/// scope.ensure("https://example.com/artifact")?;
/// // Dropping `scope` purges everything, since the wrapped cache is ephemeral.
/// # Ok(())
/// # }
/// ```
pub struct EphemeralCache {
    cache: Cache,
}

impl EphemeralCache {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

impl std::ops::Deref for EphemeralCache {
    type Target = Cache;

    fn deref(&self) -> &Cache {
        &self.cache
    }
}

impl Drop for EphemeralCache {
    fn drop(&mut self) {
        if self.cache.max_size() != 0 {
            return;
        }
        if let Err(e) = self.cache.purge(Some(0), None) {
            tracing::warn!(error = %e, "failed to purge ephemeral cache on scope exit");
        }
    }
}
