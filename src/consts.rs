use std::time::Duration;

/// Name of the subdirectory that holds cached payload files.
pub const CACHE_DIR_NAME: &str = "cache";
/// Name of the subdirectory that holds per-entry lock files.
pub const LOCK_DIR_NAME: &str = "lock";
/// Name of the whole-cache lock file at the cache root.
pub const PURGE_LOCK_FILE_NAME: &str = "cache.lock";

/// Number of hex characters in a cache key (128-bit MD5 digest).
pub const KEY_HEX_LEN: usize = 32;

/// Default size bound applied when a cache is constructed without an
/// explicit `max_size`: a few gigabytes.
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default age bound applied by `Cache::purge` when called without an
/// explicit `max_age`: one day.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
