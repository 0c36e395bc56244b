//! Cache configuration.
//!
//! One setting: the directory holding per-table cache files. The value is
//! passed into store construction explicitly; nothing here is global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Environment variable naming a TOML settings file.
pub const CONFIG_PATH_ENV: &str = "IDCACHE_CONFIG";

/// Environment variable overriding the cache root directly.
pub const CACHE_ROOT_ENV: &str = "IDCACHE_CACHE_ROOT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub cache_root: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
        }
    }
}

/// `$HOME/data/cached_data`, or `./data/cached_data` without a home directory.
pub fn default_cache_root() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("data")
        .join("cached_data")
}

impl CacheSettings {
    pub fn with_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    /// Load settings from the environment.
    ///
    /// `IDCACHE_CONFIG` wins when set, then `IDCACHE_CACHE_ROOT`, then the default.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let root_override = std::env::var_os(CACHE_ROOT_ENV).map(PathBuf::from);
        Self::resolve(config_path.as_deref(), root_override)
    }

    pub fn resolve(
        config_path: Option<&Path>,
        root_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let settings = match (config_path, root_override) {
            (Some(path), _) => Self::from_path(path)?,
            (None, Some(root)) => Self::with_root(root),
            (None, None) => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let settings: CacheSettings = toml::from_str(&contents)?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache_root",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
