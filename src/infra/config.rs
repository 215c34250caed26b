//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument
//! (default: config/dev.toml). A missing or broken file falls back to
//! the built-in defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct CanConfig {
    /// Serial device of the SLCAN adapter
    pub device: String,
    /// Serial link speed
    #[serde(default = "default_can_baud")]
    pub baud: u32,
    /// CAN bus bitrate
    #[serde(default = "default_can_bitrate")]
    pub bitrate: u32,
}

fn default_can_baud() -> u32 {
    115_200
}

fn default_can_bitrate() -> u32 {
    125_000 // comfort bus speed
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

fn default_database_path() -> String {
    "triplog.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Every n-th aggregated frame emits a record summary log
    #[serde(default = "default_summary_every")]
    pub summary_every: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { summary_every: default_summary_every() }
    }
}

fn default_summary_every() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub can: CanConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    can_device: String,
    can_baud: u32,
    can_bitrate: u32,
    database_path: String,
    summary_every: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            can_device: "/dev/ttyACM0".to_string(),
            can_baud: 115_200,
            can_bitrate: 125_000,
            database_path: "triplog.db".to_string(),
            summary_every: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            can_device: toml_config.can.device,
            can_baud: toml_config.can.baud,
            can_bitrate: toml_config.can.bitrate,
            database_path: toml_config.database.path,
            summary_every: toml_config.recorder.summary_every,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn can_device(&self) -> &str {
        &self.can_device
    }

    pub fn can_baud(&self) -> u32 {
        self.can_baud
    }

    pub fn can_bitrate(&self) -> u32 {
        self.can_bitrate
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    pub fn summary_every(&self) -> u64 {
        self.summary_every
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.can_device(), "/dev/ttyACM0");
        assert_eq!(config.can_baud(), 115_200);
        assert_eq!(config.can_bitrate(), 125_000);
        assert_eq!(config.database_path(), "triplog.db");
        assert_eq!(config.summary_every(), 10);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load("/nonexistent/path.toml");
        assert_eq!(config.database_path(), "triplog.db");
        assert_eq!(config.config_file(), "default");
    }
}
