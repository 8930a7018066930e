//! Service configuration
//!
//! Loaded from a TOML file; every key is optional:
//!
//! ```toml
//! tracked_files_debounce_ms = 300
//! watcher_debounce_ms = 100
//! skip_patterns = ["node_modules", ".git/objects"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, Result};
use crate::service::filter::DEFAULT_SKIP_PATTERNS;

/// Configuration for [`RepositoryService`](crate::service::RepositoryService)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Quiet period before tracked files are re-listed after `.git/` churn
    pub tracked_files_debounce_ms: u64,

    /// Directories whose contents are dropped from incremental events
    pub skip_patterns: Vec<String>,

    /// Batching window for native filesystem notifications
    pub watcher_debounce_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tracked_files_debounce_ms: 300,
            skip_patterns: DEFAULT_SKIP_PATTERNS.iter().map(|p| p.to_string()).collect(),
            watcher_debounce_ms: 100,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| RepoError::io(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RepoError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    pub fn tracked_files_debounce(&self) -> Duration {
        Duration::from_millis(self.tracked_files_debounce_ms)
    }

    pub fn watcher_debounce(&self) -> Duration {
        Duration::from_millis(self.watcher_debounce_ms)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce_duration: self.watcher_debounce(),
        }
    }
}

/// Configuration for the filesystem watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Debounce duration (default: 100ms)
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(100),
        }
    }
}
