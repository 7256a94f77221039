//! Configuration system for gridlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GRIDLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/gridlink/config.toml
//!   3. ~/.config/gridlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_MAX_CHUNK, DEFAULT_NAME_PREFIX, MAX_ATTRIBUTE_LEN};

/// Where the receiving side keeps the last grid it accepted.
pub const DEFAULT_GRID_PATH: &str = "/var/tmp/tmbot-grid.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridlinkConfig {
    pub device: DeviceConfig,
    pub transfer: TransferSettings,
    pub discovery: DiscoveryConfig,
    pub peer: PeerConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Advertised name prefix to match during discovery.
    pub name_prefix: String,
    /// Explicit address. Empty = discover by name prefix.
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Max payload bytes per Chunk frame, and the inline threshold.
    pub max_chunk: usize,
    /// Seconds to keep listening for status after the final write.
    pub grace_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Record file written by the (loopback) receiving peer.
    pub grid_path: PathBuf,
    /// Largest payload the peer accepts.
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub path: PathBuf,
    pub interval_secs: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            address: String::new(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_chunk: DEFAULT_MAX_CHUNK,
            grace_secs: 2.0,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { timeout_secs: 10.0 }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            grid_path: PathBuf::from(DEFAULT_GRID_PATH),
            max_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_GRID_PATH),
            interval_secs: 1.0,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("gridlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Convert a seconds value from config into a `Duration`.
pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GridlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GridlinkConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GRIDLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GridlinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject values the link or the runtime cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.max_chunk == 0 {
            return Err(ConfigError::Invalid {
                field: "transfer.max_chunk",
                reason: "must be at least 1".into(),
            });
        }
        if self.transfer.max_chunk + 1 > MAX_ATTRIBUTE_LEN {
            return Err(ConfigError::Invalid {
                field: "transfer.max_chunk",
                reason: format!(
                    "chunk frame of {} bytes exceeds the {} byte attribute limit",
                    self.transfer.max_chunk + 1,
                    MAX_ATTRIBUTE_LEN
                ),
            });
        }
        for (field, value) in [
            ("transfer.grace_secs", self.transfer.grace_secs),
            ("discovery.timeout_secs", self.discovery.timeout_secs),
            ("watch.interval_secs", self.watch.interval_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is not a non-negative number of seconds"),
                });
            }
        }
        if self.watch.interval_secs == 0.0 {
            return Err(ConfigError::Invalid {
                field: "watch.interval_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn grace(&self) -> Duration {
        secs(self.transfer.grace_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        secs(self.discovery.timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        secs(self.watch.interval_secs)
    }

    /// Explicit address, if one is configured.
    pub fn address(&self) -> Option<&str> {
        Some(self.device.address.as_str()).filter(|a| !a.is_empty())
    }

    /// Apply GRIDLINK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GRIDLINK_DEVICE__NAME_PREFIX") {
            self.device.name_prefix = v;
        }
        if let Some(v) = lookup("GRIDLINK_DEVICE__ADDRESS") {
            self.device.address = v;
        }
        if let Some(v) = lookup("GRIDLINK_TRANSFER__MAX_CHUNK") {
            if let Ok(n) = v.parse() {
                self.transfer.max_chunk = n;
            }
        }
        if let Some(v) = lookup("GRIDLINK_TRANSFER__GRACE_SECS") {
            if let Ok(s) = v.parse() {
                self.transfer.grace_secs = s;
            }
        }
        if let Some(v) = lookup("GRIDLINK_DISCOVERY__TIMEOUT_SECS") {
            if let Ok(s) = v.parse() {
                self.discovery.timeout_secs = s;
            }
        }
        if let Some(v) = lookup("GRIDLINK_PEER__GRID_PATH") {
            self.peer.grid_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GRIDLINK_WATCH__PATH") {
            self.watch.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GRIDLINK_WATCH__INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.watch.interval_secs = s;
            }
        }
    }
}
