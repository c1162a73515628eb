//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Shortest accepted collection interval in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 100;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Collection interval in milliseconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Samples kept per metric in the in-process history
    #[serde(default = "default_history")]
    pub history: usize,

    /// Enabled sinks
    #[serde(default)]
    pub sinks: SinkConfig,

    /// Web server configuration
    #[serde(default)]
    pub web: WebConfig,
}

/// Sink selection. Sinks run in the order listed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Publish to in-process observers
    #[serde(default = "default_true")]
    pub event_bus: bool,

    /// Push to WebSocket subscribers
    #[serde(default = "default_true")]
    pub hub: bool,

    /// Log every snapshot at info level
    #[serde(default)]
    pub log: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            event_bus: true,
            hub: true,
            log: false,
        }
    }
}

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    /// Whether to serve the push endpoint
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Listen address (e.g., "127.0.0.1:9980")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Per-frame send timeout in milliseconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,

    /// Snapshots buffered per subscriber before it starts missing some
    #[serde(default = "default_queue")]
    pub queue: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enable: true,
            listen: default_listen(),
            send_timeout: default_send_timeout(),
            queue: default_queue(),
        }
    }
}

// Default value functions
fn default_interval() -> u64 {
    1000
}

fn default_history() -> usize {
    101
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "127.0.0.1:9980".to_string()
}

fn default_send_timeout() -> u64 {
    1000
}

fn default_queue() -> usize {
    16
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Loads configuration from a TOML file, using defaults if it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            warn!(
                "Configuration file {} not found, using defaults",
                path.as_ref().display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        if config.interval < MIN_INTERVAL_MS {
            warn!(
                "Collection interval {}ms is below the minimum, using {}ms",
                config.interval, MIN_INTERVAL_MS
            );
            config.interval = MIN_INTERVAL_MS;
        }
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.web.send_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            history: default_history(),
            sinks: SinkConfig::default(),
            web: WebConfig::default(),
        }
    }
}
