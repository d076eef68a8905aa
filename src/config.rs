//! Loads the three cache tunables from a TOML file with environment
//! variable overrides, following this codebase's layered
//! file-then-environment convention in its configuration crate —
//! simplified here to one consumer and no multi-source merge trait.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::consts::{DEFAULT_MAX_AGE, DEFAULT_MAX_SIZE};

const ENV_ROOT: &str = "DOWNLOAD_CACHE_ROOT";
const ENV_MAX_SIZE: &str = "DOWNLOAD_CACHE_MAX_SIZE";
const ENV_MAX_AGE_SECS: &str = "DOWNLOAD_CACHE_MAX_AGE_SECS";

/// The tunables accepted by [`crate::Cache::new`], resolved from
/// defaults, an optional TOML file, and environment variables, in that
/// order of increasing precedence.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_size: u64,
    pub max_age_secs: u64,
}

/// The subset of [`CacheConfig`] that may appear in a TOML file. Every
/// field is optional so a file can override just one tunable.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    root: Option<PathBuf>,
    max_size: Option<u64>,
    max_age_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnvVar { var: &'static str, value: String },
}

impl CacheConfig {
    fn defaults() -> Self {
        Self {
            root: default_root(),
            max_size: DEFAULT_MAX_SIZE,
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
        }
    }

    /// Loads configuration with no TOML file, applying only defaults and
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from `path` (if given), layering defaults,
    /// the file's contents, and environment variable overrides — in
    /// that order, so the environment always wins.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults();

        if let Some(path) = path {
            let file = read_file_config(path)?;
            if let Some(root) = file.root {
                config.root = root;
            }
            if let Some(max_size) = file.max_size {
                config.max_size = max_size;
            }
            if let Some(max_age_secs) = file.max_age_secs {
                config.max_age_secs = max_age_secs;
            }
        }

        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs_err::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env_overrides(config: &mut CacheConfig) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(ENV_ROOT) {
        config.root = PathBuf::from(value);
    }
    if let Ok(value) = std::env::var(ENV_MAX_SIZE) {
        config.max_size = value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar {
                var: ENV_MAX_SIZE,
                value: value.clone(),
            })?;
    }
    if let Ok(value) = std::env::var(ENV_MAX_AGE_SECS) {
        config.max_age_secs = value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar {
                var: ENV_MAX_AGE_SECS,
                value: value.clone(),
            })?;
    }
    Ok(())
}

fn default_root() -> PathBuf {
    std::env::temp_dir().join("download-cache")
}
