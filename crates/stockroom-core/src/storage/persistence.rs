//! Automerge document persistence
//!
//! Saves and loads the namespace document under
//! `{data_dir}/users/{userId}/inventory.automerge`. Writes go to a temp
//! file which is then renamed over the target so the document on disk is
//! never half-written.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::Config;
use crate::document::InventoryDocument;
use crate::storage::error::{StorageError, StorageResult};
use crate::user_id::UserId;

/// Persistence for one namespace document
pub struct AutomergePersistence {
    config: Config,
    user_id: UserId,
}

impl AutomergePersistence {
    pub fn new(config: Config, user_id: UserId) -> Self {
        Self { config, user_id }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> PathBuf {
        self.config.document_path(&self.user_id)
    }

    /// Check if the document exists on disk
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Save the document using an atomic write
    pub fn save(&self, doc: &mut InventoryDocument) -> Result<()> {
        let bytes = doc.save();
        let path = self.path();

        atomic_write(&path, &bytes)
            .with_context(|| format!("Failed to save document to {:?}", path))?;
        debug!("Saved {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    /// Load the document from disk
    ///
    /// Returns `None` if there is no document yet. A file that cannot be
    /// parsed is copied aside to `*.corrupt.backup` and reported as
    /// [`StorageError::CorruptDocument`].
    pub fn load(&self) -> Result<Option<InventoryDocument>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|e| StorageError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        match InventoryDocument::load_for(self.user_id, &bytes) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                let backup_path = path.with_extension("automerge.corrupt.backup");
                fs::copy(&path, &backup_path)
                    .with_context(|| format!("Failed to back up {:?}", path))?;
                warn!("Document at {:?} is unreadable: {}", path, e);
                Err(StorageError::CorruptDocument {
                    path,
                    backup_path,
                    details: e.to_string(),
                }
                .into())
            }
        }
    }

    /// Load the existing document or create and save a new one
    pub fn load_or_create(&self) -> Result<InventoryDocument> {
        if let Some(doc) = self.load()? {
            return Ok(doc);
        }

        let mut doc = InventoryDocument::new(self.user_id);
        self.save(&mut doc)?;
        Ok(doc)
    }
}

/// Write data to a file atomically
///
/// Creates missing parent directories, writes and syncs a sibling temp
/// file, then renames it onto `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::AtomicWriteFailed {
        from: temp_path,
        to: path.to_path_buf(),
        source: e,
    })
}
