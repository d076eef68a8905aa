//! Path layout & initialization of a cache root.

use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::consts::{CACHE_DIR_NAME, LOCK_DIR_NAME, PURGE_LOCK_FILE_NAME};
use crate::error::CacheError;

/// The three canonical paths that live directly under a cache root.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub purge_lock_file: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join(CACHE_DIR_NAME),
            lock_dir: root.join(LOCK_DIR_NAME),
            purge_lock_file: root.join(PURGE_LOCK_FILE_NAME),
            root,
        }
    }

    pub fn payload_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(key)
    }

    pub fn lock_path(&self, key: &str) -> PathBuf {
        self.lock_dir.join(key)
    }

    /// Creates the canonical layout if absent and removes any stray entry
    /// directly under `root`. Idempotent and safe under concurrent
    /// invocation by other processes: every step tolerates "already
    /// exists" / "already gone" races rather than failing.
    pub fn init(&self) -> Result<(), CacheError> {
        create_dir_all_tolerant(&self.root)?;
        create_dir_all_tolerant(&self.cache_dir)?;
        create_dir_all_tolerant(&self.lock_dir)?;
        self.sweep_stray_entries()?;
        create_purge_lock_file_tolerant(&self.purge_lock_file)?;
        Ok(())
    }

    /// Removes any direct child of `root` that is not `cache/`, `lock/`,
    /// or `cache.lock`. Stray directories are removed recursively.
    fn sweep_stray_entries(&self) -> Result<(), CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.root, e))?;
            let name = entry.file_name();
            if name == CACHE_DIR_NAME || name == LOCK_DIR_NAME || name == PURGE_LOCK_FILE_NAME {
                continue;
            }

            let path = entry.path();
            let remove_result = if entry.path().is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match remove_result {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed stray cache-root entry");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // A concurrent initializer already removed it.
                }
                Err(e) => return Err(CacheError::io(&path, e)),
            }
        }
        Ok(())
    }
}

fn create_dir_all_tolerant(path: &Path) -> Result<(), CacheError> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

fn create_purge_lock_file_tolerant(path: &Path) -> Result<(), CacheError> {
    match fs::OpenOptions::new().create_new(true).write(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}
