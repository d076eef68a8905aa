use std::path::PathBuf;

/// Errors produced by the cache.
///
/// `LockBusy` is only ever constructed internally by the purger's
/// non-blocking lock attempts; it never escapes `Cache::purge`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A filesystem operation failed.
    #[error("io error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The fetcher failed to retrieve the object.
    #[error("failed to fetch '{uri}': {source}")]
    FetchFailed {
        uri: String,
        #[source]
        source: FetchError,
    },

    /// A non-blocking lock acquisition could not proceed immediately.
    #[error("lock busy")]
    LockBusy,
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors returned by a [`crate::Fetcher`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// An I/O error occurred while writing the destination file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The URI scheme is not supported by this fetcher.
    #[error("unsupported uri scheme: '{0}'")]
    UnsupportedScheme(String),

    /// The URI could not be parsed.
    #[error("invalid uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// The remote transfer itself failed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
