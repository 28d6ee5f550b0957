//! Classified filesystem and database failures
//!
//! Low-level I/O errors are sorted into the handful of cases a shop owner
//! can actually act on, each with a hint on what to do next.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied on '{path}'")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No space left while writing '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Inventory data at '{path}' is unreadable ({details}); a copy was kept at '{backup_path}'")]
    CorruptDocument {
        path: PathBuf,
        backup_path: PathBuf,
        details: String,
    },

    #[error("'{path}' does not exist")]
    NotFound { path: PathBuf },

    #[error("Could not move '{from}' into place at '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StorageError {
    /// Classify an I/O error raised while writing `path`
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ if is_disk_full(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// What the user can do about it, if anything
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } | StorageError::CreateDirectory { .. } => {
                Some("Check that the data directory is writable, or point STOCKROOM_DATA_DIR elsewhere.")
            }
            StorageError::CorruptDocument { .. } => Some(
                "Move the damaged file away and run `stockroom sync` to restore from another device.",
            ),
            _ => None,
        }
    }
}

// ENOSPC (28) on unix, ERROR_DISK_FULL (112) on windows
fn is_disk_full(error: &io::Error) -> bool {
    if matches!(error.raw_os_error(), Some(28) | Some(112)) {
        return true;
    }
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

pub type StorageResult<T> = Result<T, StorageError>;
