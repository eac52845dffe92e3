//! Configuration loading for the feed engine.
//!
//! Configuration is loaded from a TOML file (default: `adwatch.toml`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the feed engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Feed endpoint configuration.
    #[serde(default)]
    pub feed: FeedUrls,
    /// Fallback polling configuration.
    #[serde(default)]
    pub poll: PollConfig,
    /// Snapshot persistence configuration.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Feed endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedUrls {
    /// WebSocket streaming endpoint (default: wss://localhost/ws).
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// HTTP fallback endpoint returning the full batch (default: https://localhost/cars).
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    /// Notification sound location (default: https://localhost/notification.wav).
    #[serde(default = "default_sound_url")]
    pub sound_url: String,
}

/// Fallback polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Seconds between successful fallback polls (default: 30).
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Backoff ceiling in seconds for failing polls (default: 60).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Path to the snapshot file (default: recentCars.json).
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
    /// Snapshot time-to-live in seconds (default: 7 days).
    #[serde(default = "default_snapshot_ttl")]
    pub ttl_secs: u64,
}

// Default value functions
fn default_stream_url() -> String {
    "wss://localhost/ws".to_string()
}

fn default_fallback_url() -> String {
    "https://localhost/cars".to_string()
}

fn default_sound_url() -> String {
    "https://localhost/notification.wav".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_backoff() -> u64 {
    60
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("recentCars.json")
}

fn default_snapshot_ttl() -> u64 {
    7 * 24 * 60 * 60 // 7 days in seconds
}

impl Default for FeedUrls {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            fallback_url: default_fallback_url(),
            sound_url: default_sound_url(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
            ttl_secs: default_snapshot_ttl(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed: FeedUrls::default(),
            poll: PollConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl PollConfig {
    /// Interval between successful polls.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Backoff ceiling for failing polls.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl SnapshotConfig {
    /// Snapshot time-to-live.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
