//! Configuration management for `ledgersync`
//!
//! Handles loading of the process configuration from TOML files. The ledger
//! network document itself (network → clients → connection profile) is JSON
//! and lives in [`crate::network::profile`].

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

fn default_log_directory() -> String {
    "logs".to_string()
}

/// How the controller schedules ticks relative to slow synchronizations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Next tick is due one interval after the previous tick was due
    #[default]
    FixedRate,
    /// Next tick is due one interval after the previous tick body finished
    FixedDelay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path to the JSON network configuration document
    pub network_config: PathBuf,
    /// File backing the persisted per-channel block heights
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Single-supervisor lock file
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Sync interval in minutes; overridden by `blocksSyncTime` in the network document
    #[serde(default)]
    pub blocks_sync_time: Option<String>,
    /// Upper bound on channels synchronized at the same time (0 = one per channel)
    #[serde(default)]
    pub max_concurrent_channels: usize,
    #[serde(default)]
    pub schedule: ScheduleMode,
    /// Seconds to wait for in-flight synchronizations on shutdown
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Rewrite gateway hosts to localhost (local test networks)
    #[serde(default)]
    pub discovery_as_localhost: bool,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("ledgersync_state.json")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("ledgersync.lock")
}

const fn default_drain_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    /// Upstream webhook receiving sync notices; notices are dropped when unset
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// - File I/O errors (file not found, permission denied, invalid path)
    /// - TOML parsing errors (invalid syntax, type mismatches, missing required fields)
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::LedgerSyncError::Io)?;

        let config: Self =
            toml::from_str(&content).map_err(crate::LedgerSyncError::TomlParsing)?;

        Ok(config)
    }

    /// Load configuration from default config file path
    ///
    /// # Errors
    /// - No config file found (neither config.toml nor config.example.toml exists)
    /// - File I/O or TOML parsing errors
    pub fn load() -> crate::Result<Self> {
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(crate::LedgerSyncError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Get network configuration document path
    #[must_use]
    pub fn network_config_path(&self) -> &Path {
        &self.sync.network_config
    }

    /// Get raw sync interval (minutes) from the TOML file, if any
    #[must_use]
    pub fn blocks_sync_time(&self) -> Option<&str> {
        self.sync.blocks_sync_time.as_deref()
    }

    /// Get scheduling mode
    #[must_use]
    pub const fn schedule_mode(&self) -> ScheduleMode {
        self.sync.schedule
    }

    /// Get max concurrent channel synchronizations, `None` when unbounded
    #[must_use]
    pub const fn max_concurrent_channels(&self) -> Option<usize> {
        if self.sync.max_concurrent_channels == 0 {
            None
        } else {
            Some(self.sync.max_concurrent_channels)
        }
    }

    /// Get shutdown drain timeout
    #[must_use]
    pub const fn drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync.drain_timeout_secs)
    }

    /// Get webhook URL for notices
    #[must_use]
    pub fn webhook_url(&self) -> Option<&str> {
        self.notify.webhook_url.as_deref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: default_log_directory(),
            },
            sync: SyncConfig {
                network_config: PathBuf::from("config.json"),
                state_file: default_state_file(),
                lock_file: default_lock_file(),
                blocks_sync_time: None,
                max_concurrent_channels: 0,
                schedule: ScheduleMode::FixedRate,
                drain_timeout_secs: default_drain_timeout_secs(),
                discovery_as_localhost: false,
            },
            notify: NotifyConfig::default(),
        }
    }
}
