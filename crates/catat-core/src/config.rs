//! TOML-based application configuration.
//!
//! Stores the owner identity and the tunables for:
//! - Orphan sanitization cutoff
//! - Flow window alarm cadence
//! - Haid mode prompt interval and skip categories
//! - Unlogged block size and retention
//!
//! Configuration is stored at `~/.config/catat/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/catat[-dev]/` based on CATAT_ENV.
///
/// Set CATAT_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CATAT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("catat-dev")
    } else {
        base_dir.join("catat")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/catat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logical owner of every synced record. One owner, many devices.
    #[serde(default = "default_owner")]
    pub owner_id: String,
    /// Running activities older than this are force-closed at startup.
    #[serde(default = "default_orphan_max_age_hours")]
    pub orphan_max_age_hours: i64,
    /// Flow window alarm repeat interval.
    #[serde(default = "default_alarm_repeat_minutes")]
    pub alarm_repeat_minutes: i64,
    /// Days between "still in haid mode?" prompts.
    #[serde(default = "default_haid_prompt_interval_days")]
    pub haid_prompt_interval_days: i64,
    /// Template categories skipped (not missed) while haid mode is active.
    #[serde(default = "default_haid_skip_categories")]
    pub haid_skip_categories: Vec<String>,
    /// Size of an unlogged awareness block.
    #[serde(default = "default_unlogged_block_minutes")]
    pub unlogged_block_minutes: i64,
    /// Unlogged blocks older than this are pruned.
    #[serde(default = "default_unlogged_retention_days")]
    pub unlogged_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_id: default_owner(),
            orphan_max_age_hours: default_orphan_max_age_hours(),
            alarm_repeat_minutes: default_alarm_repeat_minutes(),
            haid_prompt_interval_days: default_haid_prompt_interval_days(),
            haid_skip_categories: default_haid_skip_categories(),
            unlogged_block_minutes: default_unlogged_block_minutes(),
            unlogged_retention_days: default_unlogged_retention_days(),
        }
    }
}

impl Config {
    /// Load from `config.toml` in the data directory, falling back to
    /// defaults (and writing them out) when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/catat"),
            message: e.to_string(),
        })?;
        Self::load_from(dir.join("config.toml"))
    }

    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
            return Ok(config);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::SaveFailed {
            path: PathBuf::from("~/.config/catat"),
            message: e.to_string(),
        })?;
        self.save_to(&dir.join("config.toml"))
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}

// Default functions
fn default_owner() -> String {
    "owner-local".to_string()
}
fn default_orphan_max_age_hours() -> i64 {
    24
}
fn default_alarm_repeat_minutes() -> i64 {
    2
}
fn default_haid_prompt_interval_days() -> i64 {
    6
}
fn default_haid_skip_categories() -> Vec<String> {
    vec!["prayer".to_string(), "quran".to_string()]
}
fn default_unlogged_block_minutes() -> i64 {
    30
}
fn default_unlogged_retention_days() -> i64 {
    7
}
