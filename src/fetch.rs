//! The pluggable remote-object reader the cache engine calls on a miss.

use std::io::Write;
use std::path::Path;

use fs_err as fs;
use url::Url;

use crate::error::FetchError;

/// Streams the bytes of a remote object to a destination path.
///
/// Implementations write the *complete* object to `destination` and
/// return `Ok(())` only once every byte has been written; the cache
/// engine is responsible for staging the destination under a temporary
/// name and renaming it into place, so a `Fetcher` never has to reason
/// about partial visibility.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, uri: &str, destination: &Path) -> Result<(), FetchError>;
}

/// Default fetcher: streams `http(s)://` URIs with a blocking HTTP client
/// and copies `file://` URIs directly. Callers targeting other
/// object-store schemes (e.g. `gs://`, `s3://`) supply their own
/// [`Fetcher`] — this cache is agnostic to how bytes are obtained.
#[derive(Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str, destination: &Path) -> Result<(), FetchError> {
        let url = Url::parse(uri).map_err(|source| FetchError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;

        match url.scheme() {
            "http" | "https" => fetch_http(&self.client, &url, destination),
            "file" => fetch_file(&url, destination),
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}

fn fetch_http(
    client: &reqwest::blocking::Client,
    url: &Url,
    destination: &Path,
) -> Result<(), FetchError> {
    let mut response = client.get(url.clone()).send()?.error_for_status()?;
    let mut file = fs::File::create(destination).map_err(FetchError::Io)?;
    response.copy_to(&mut file)?;
    file.flush().map_err(FetchError::Io)?;
    Ok(())
}

fn fetch_file(url: &Url, destination: &Path) -> Result<(), FetchError> {
    let source = url
        .to_file_path()
        .map_err(|()| FetchError::UnsupportedScheme("file".to_string()))?;
    fs::copy(&source, destination).map_err(FetchError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct StaticFetcher(&'static [u8]);

    impl Fetcher for StaticFetcher {
        fn fetch(&self, _uri: &str, destination: &Path) -> Result<(), FetchError> {
            fs::write(destination, self.0).map_err(FetchError::Io)
        }
    }

    #[test]
    fn stub_fetcher_writes_full_contents() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("payload");
        StaticFetcher(b"hello world").fetch("stub://anything", &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"hello world");
    }

    #[test]
    fn file_scheme_copies_local_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("source");
        fs::write(&src, b"local bytes").unwrap();
        let dst = dir.path().join("dest");

        let url = Url::from_file_path(&src).unwrap();
        fetch_file(&url, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"local bytes");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("dest");
        let err = HttpFetcher::new().fetch("gs://bucket/key", &dst).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(scheme) if scheme == "gs"));
    }
}
