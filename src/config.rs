use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::history::DEFAULT_HISTORY_SIZE;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub downloads: DownloadsConfig,
    pub simulation: SimulationConfig,
    pub history: HistoryConfig,
}

/// Where per-profile documents live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// redb database file (empty = <data_dir>/offsync/offsync.redb)
    pub db_path: Option<String>,
}

/// Download lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Maximum concurrent transfers
    pub max_concurrent: usize,
    /// Give up on a transfer after this many seconds (0 = never)
    pub transfer_timeout_secs: u64,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            transfer_timeout_secs: 0,
        }
    }
}

/// Synthetic transfer used when no real fetcher is plugged in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total duration of one transfer in milliseconds
    pub transfer_ms: u64,
    /// Progress ticks per transfer
    pub progress_steps: u8,
    /// Probability (0.0-1.0) that a transfer fails
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            transfer_ms: 2000,
            progress_steps: 10,
            failure_rate: 0.0,
        }
    }
}

/// Recently-played list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("offsync");

        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .context("Failed to read config file")?;

            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl DownloadsConfig {
    pub fn effective_max_concurrent(&self) -> usize {
        if self.max_concurrent > 0 {
            self.max_concurrent
        } else {
            DownloadsConfig::default().max_concurrent
        }
    }

    pub fn transfer_timeout(&self) -> Option<std::time::Duration> {
        (self.transfer_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.transfer_timeout_secs))
    }
}
