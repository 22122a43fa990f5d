use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::SheetLayout;
use crate::retry::RetryPolicy;

pub const ENV_CACHE_DIR: &str = "KPI_SYNC_CACHE_DIR";
pub const ENV_TTL_SECS: &str = "KPI_SYNC_TTL_SECS";
pub const ENV_REFRESH_SECS: &str = "KPI_SYNC_REFRESH_SECS";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "KPI_SYNC_REMOTE_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{name}={value:?} is not a whole number of seconds")]
    InvalidEnv { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Runtime settings for the sync layer.
///
/// Precedence is file, then environment, then whatever the caller (usually the
/// CLI) sets afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding `pending_queue.json` and `table.json`.
    pub cache_dir: PathBuf,
    pub ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub remote_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub layout: SheetLayout,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
            ttl_secs: 900,
            refresh_interval_secs: 900,
            remote_timeout_secs: 30,
            retry: RetryPolicy::default(),
            layout: SheetLayout::default(),
        }
    }
}

impl SyncConfig {
    /// Load `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir.trim());
        }
        for (name, slot) in [
            (ENV_TTL_SECS, &mut self.ttl_secs),
            (ENV_REFRESH_SECS, &mut self.refresh_interval_secs),
            (ENV_REMOTE_TIMEOUT_SECS, &mut self.remote_timeout_secs),
        ] {
            if let Some(value) = get(name) {
                *slot = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv { name, value })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Zero("refresh_interval_secs"));
        }
        if self.remote_timeout_secs == 0 {
            return Err(ConfigError::Zero("remote_timeout_secs"));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}
