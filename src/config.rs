//! Driver configuration
//!
//! Stored as TOML, by default at `~/.config/topgun/driver.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use topgun_transport::{SessionConfig, DEFAULT_READ_TIMEOUT_MS};

fn default_read_timeout() -> i32 {
    DEFAULT_READ_TIMEOUT_MS
}

/// Top-level driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Log every report as it arrives
    #[serde(default)]
    pub debug: bool,
    /// Stop a device after this many consecutive transfer faults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient_retry_limit: Option<u32>,
    /// hidapi read timeout (ms); bounds cancellation latency
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: i32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            debug: false,
            transient_retry_limit: None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl DriverConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("topgun")
            .join("driver.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Settings handed to each device session
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            debug: self.debug,
            transient_retry_limit: self.transient_retry_limit,
        }
    }
}
