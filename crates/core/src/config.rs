//! TOML-based configuration for the mergewatch detector and daemon.
//!
//! The detector treats the configuration as an opaque read each cycle;
//! changing poll interval, enablement, remote, or branch restarts the
//! daemon's poll timer via the reload signal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;
use crate::models::UpdateStrategy;

/// Floor applied to the configured poll interval.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for one watched repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Path to the local git repository to watch.
    pub repo_path: PathBuf,

    /// Remote to fetch from and compare against (default `origin`).
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Remote branch to simulate merging with (default `main`).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Seconds between detection cycles, clamped to a minimum of 10.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Whether the poll timer runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Fast-forward or rebase the local branch onto its upstream before
    /// simulating, when it has fallen behind.
    #[serde(default)]
    pub auto_update: bool,

    /// Strategy for the auto-update step.
    #[serde(default)]
    pub update_strategy: UpdateStrategy,

    /// Simulate against uncommitted local state when the working tree is
    /// dirty, via a throwaway snapshot commit.
    #[serde(default)]
    pub simulate_dirty_tree: bool,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_poll_interval() -> u64 {
    30
}
fn default_enabled() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            remote: default_remote(),
            branch: default_branch(),
            poll_interval_secs: default_poll_interval(),
            enabled: default_enabled(),
            auto_update: false,
            update_strategy: UpdateStrategy::default(),
            simulate_dirty_tree: false,
            log_level: default_log_level(),
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::IoError(e)
            }
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate field values. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repo_path".into(),
                detail: "must not be empty".into(),
            });
        }
        if self.remote.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "remote".into(),
                detail: "must not be empty".into(),
            });
        }
        if self.branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "branch".into(),
                detail: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// The configured remote-tracking ref, e.g. `origin/main`.
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Poll interval with the 10-second floor applied.
    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            warn!(
                configured = self.poll_interval_secs,
                min = MIN_POLL_INTERVAL_SECS,
                "poll interval below minimum, clamping"
            );
        }
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}
