//! Configuration loading and parsing

use anyhow::{Context, Result};
use rtldavis_decoder::DriverConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rtldavis: DriverConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub restart: RestartConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// Seconds between archive boundaries
    #[serde(default = "default_archive_interval")]
    pub interval_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_archive_interval(),
        }
    }
}

impl ArchiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestartConfig {
    /// Unlimited when absent
    #[serde(default)]
    pub max_restarts: Option<u32>,
    #[serde(default = "default_restart_delay")]
    pub delay_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: None,
            delay_secs: default_restart_delay(),
        }
    }
}

impl RestartConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// True if another session may be started after `restarts` restarts
    pub fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }
}

fn default_archive_interval() -> u64 {
    300
}

fn default_restart_delay() -> u64 {
    10
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.archive.interval_secs == 0 {
        anyhow::bail!("archive.interval_secs must be positive");
    }

    Ok(config)
}
