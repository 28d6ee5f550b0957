//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/stockroom/config.toml)
//! 3. Environment variables (STOCKROOM_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::user_id::UserId;

/// Environment variable prefix
const ENV_PREFIX: &str = "STOCKROOM";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for all namespaces and the current user id
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Sync server URL (optional)
    #[serde(default)]
    pub sync_url: Option<String>,

    /// Whether sync is enabled
    #[serde(default)]
    pub sync_enabled: bool,

    /// Currency code used when printing money amounts
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Log file used when STOCKROOM_LOG is set
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_url: None,
            sync_enabled: false,
            currency: default_currency(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (STOCKROOM_DATA_DIR, STOCKROOM_SYNC_URL, STOCKROOM_SYNC_ENABLED)
    /// 2. Config file (~/.config/stockroom/config.toml or STOCKROOM_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears the URL
        if let Ok(val) = std::env::var(format!("{}_SYNC_URL", ENV_PREFIX)) {
            self.sync_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with STOCKROOM_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stockroom")
            .join("config.toml")
    }

    /// Path of the file holding the current user id
    pub fn user_id_path(&self) -> PathBuf {
        self.data_dir.join("user_id")
    }

    /// Directory holding everything that belongs to one namespace
    ///
    /// Mirrors the `users/{id}` namespace path.
    pub fn namespace_dir(&self, user: &UserId) -> PathBuf {
        self.data_dir.join("users").join(user.to_string())
    }

    /// Get the path to the Automerge document of a namespace
    pub fn document_path(&self, user: &UserId) -> PathBuf {
        self.namespace_dir(user).join("inventory.automerge")
    }

    /// Get the path to the SQLite projection of a namespace
    pub fn sqlite_path(&self, user: &UserId) -> PathBuf {
        self.namespace_dir(user).join("stockroom.db")
    }

    /// Get the path to the persisted sync state of a namespace
    pub fn sync_state_path(&self, user: &UserId) -> PathBuf {
        self.namespace_dir(user).join("sync_state.json")
    }

    /// Log file path, falling back to one inside the data directory
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("stockroom.log"))
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockroom")
}

fn default_currency() -> String {
    "EUR".to_string()
}
