//! Configuration loading and validation.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::calculate::summary::DEFAULT_TOP_ATTACKERS;
use crate::engine::EngineSettings;
use crate::models::{DEFAULT_DAYS_BACK, DEFAULT_MIN_WARS};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Engine defaults, overridable per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Look-back window in days
    #[serde(default = "default_days_back")]
    pub days_back: u32,

    /// Wars a player must appear in to be ranked
    #[serde(default = "default_min_wars")]
    pub min_wars: u32,

    /// Attackers listed in the latest-war spotlight
    #[serde(default = "default_top_attackers")]
    pub top_attackers: usize,

    /// Assumed war length when a war has no end time
    #[serde(default = "default_war_duration_hours")]
    pub default_war_duration_hours: u32,
}

fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}

fn default_min_wars() -> u32 {
    DEFAULT_MIN_WARS
}

fn default_top_attackers() -> usize {
    DEFAULT_TOP_ATTACKERS
}

fn default_war_duration_hours() -> u32 {
    48
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            days_back: default_days_back(),
            min_wars: default_min_wars(),
            top_attackers: default_top_attackers(),
            default_war_duration_hours: default_war_duration_hours(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            default_war_duration: Duration::hours(self.default_war_duration_hours as i64),
            top_attackers: self.top_attackers,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.days_back == 0 {
            return Err(ConfigError::ValidationError(
                "days_back must be greater than 0".to_string(),
            ));
        }

        if self.engine.top_attackers == 0 {
            return Err(ConfigError::ValidationError(
                "top_attackers must be greater than 0".to_string(),
            ));
        }

        if self.engine.default_war_duration_hours == 0 {
            return Err(ConfigError::ValidationError(
                "default_war_duration_hours must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
