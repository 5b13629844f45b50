//! Configuration loading and management
//!
//! Handles parsing of the `devday.toml` file in the data directory.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

pub const CONFIG_FILE: &str = "devday.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Notification thresholds
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Background clock settings
    #[serde(default)]
    pub clock: ClockConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Thresholds used when deriving notifications
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Days without an update before an open task is flagged as stale
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    /// A due date this many days away (or fewer) counts as at risk
    #[serde(default = "default_at_risk_days")]
    pub at_risk_days: i64,
}

fn default_stale_after_days() -> i64 {
    7
}

fn default_at_risk_days() -> i64 {
    2
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            stale_after_days: default_stale_after_days(),
            at_risk_days: default_at_risk_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockConfig {
    /// How often the clock task wakes up to reconcile elapsed time
    #[serde(default = "default_wake_interval_ms")]
    pub wake_interval_ms: u64,

    /// Seconds between state saves during `timer run`
    #[serde(default = "default_checkpoint_secs")]
    pub checkpoint_secs: u64,
}

fn default_wake_interval_ms() -> u64 {
    1000
}

fn default_checkpoint_secs() -> u64 {
    60
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            wake_interval_ms: default_wake_interval_ms(),
            checkpoint_secs: default_checkpoint_secs(),
        }
    }
}

impl ClockConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// How long to wait for a document lock held by another process
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `devday.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data directory, or return defaults
    pub fn load_from_dir(data_dir: &Path) -> Self {
        let config_path = data_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.notifications.stale_after_days <= 0 {
            return Err(Error::InvalidConfig(
                "notifications.stale_after_days must be > 0".to_string(),
            ));
        }
        if self.notifications.at_risk_days < 0 {
            return Err(Error::InvalidConfig(
                "notifications.at_risk_days must be >= 0".to_string(),
            ));
        }
        if self.clock.wake_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "clock.wake_interval_ms must be > 0".to_string(),
            ));
        }
        if self.clock.wake_interval_ms > 60_000 {
            return Err(Error::InvalidConfig(
                "clock.wake_interval_ms must be <= 60000".to_string(),
            ));
        }
        if self.clock.checkpoint_secs == 0 {
            return Err(Error::InvalidConfig(
                "clock.checkpoint_secs must be > 0".to_string(),
            ));
        }
        if self.storage.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "storage.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
