//! Identity stub
//!
//! Generates and persists the anonymous user id that partitions data into
//! a namespace. There is no authentication: anyone who knows an id can
//! use it, which is also how a second device joins the same namespace.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::storage::persistence::atomic_write;
use crate::user_id::UserId;

/// Identity manager
///
/// Reads and writes the current user id in the data directory.
pub struct Identity {
    config: Config,
}

/// Result of initialization
#[derive(Debug)]
pub struct InitResult {
    /// The user id now in effect
    pub user_id: UserId,
    /// Whether a fresh id was generated (vs joining an existing one)
    pub is_new: bool,
}

impl Identity {
    /// Create an identity manager with default configuration
    pub fn new() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Ok(Self::with_config(config))
    }

    /// Create an identity manager with specific configuration
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Check whether a user id has been stored
    pub fn is_initialized(&self) -> bool {
        self.config.user_id_path().exists()
    }

    /// Get the stored user id, if any
    pub fn current(&self) -> Result<Option<UserId>> {
        let path = self.config.user_id_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read user id from {:?}", path))?;
        let id = content
            .trim()
            .parse::<UserId>()
            .with_context(|| format!("Invalid user id in {:?}", path))?;
        Ok(Some(id))
    }

    /// Get the stored user id, generating and persisting one on first use
    pub fn load_or_create(&self) -> Result<UserId> {
        if let Some(id) = self.current()? {
            return Ok(id);
        }
        Ok(self.initialize_new()?.user_id)
    }

    /// Get the config file path (for display purposes)
    pub fn config_path(&self) -> PathBuf {
        Config::config_file_path()
    }

    /// Get the data directory path (for display purposes)
    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }

    /// Initialize with a freshly generated id
    ///
    /// Returns an error if already initialized.
    pub fn initialize_new(&self) -> Result<InitResult> {
        self.ensure_uninitialized()?;

        let user_id = UserId::new();
        self.store(&user_id)?;
        info!("Generated new user id {}", user_id);

        Ok(InitResult {
            user_id,
            is_new: true,
        })
    }

    /// Initialize by adopting an id created elsewhere
    ///
    /// The namespace document is created locally on first open and merges
    /// with the other device's copy on sync.
    ///
    /// Returns an error if already initialized.
    pub fn initialize_join(&self, user_id: UserId) -> Result<InitResult> {
        self.ensure_uninitialized()?;

        self.store(&user_id)?;
        info!("Joined existing user id {}", user_id);

        Ok(InitResult {
            user_id,
            is_new: false,
        })
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        if self.is_initialized() {
            anyhow::bail!(
                "Already initialized. Use `stockroom device show` to see your user id."
            );
        }
        Ok(())
    }

    fn store(&self, user_id: &UserId) -> Result<()> {
        let path = self.config.user_id_path();
        atomic_write(&path, user_id.to_string().as_bytes())
            .with_context(|| format!("Failed to save user id to {:?}", path))
    }
}
