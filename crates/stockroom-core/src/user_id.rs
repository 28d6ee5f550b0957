//! Anonymous user id
//!
//! A random identifier generated on first use and persisted locally.
//! It only partitions data into a `users/{id}` namespace; it proves
//! nothing about who is using it.
//!
//! The same 16 bytes double as the Automerge document id for sync, encoded
//! with bs58check the way automerge-repo expects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Collection;

/// URL scheme used by automerge-repo document URLs
const AUTOMERGE_URL_PREFIX: &str = "automerge:";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UserIdError {
    #[error("Invalid user id: {0}")]
    InvalidUuid(String),

    #[error("Invalid document id encoding: {0}")]
    InvalidEncoding(String),

    #[error("Document id must be 16 bytes, got {0}")]
    InvalidLength(usize),
}

/// Partition key for one user's collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Namespace path, `users/{id}`
    pub fn namespace(&self) -> String {
        format!("users/{}", self.0)
    }

    /// Path of a collection inside this namespace, `users/{id}/{collection}`
    pub fn collection_path(&self, collection: Collection) -> String {
        format!("{}/{}", self.namespace(), collection.name())
    }

    /// Path of a single record, `users/{id}/{collection}/{record}`
    pub fn document_path(&self, collection: Collection, record: &Uuid) -> String {
        format!("{}/{}", self.collection_path(collection), record)
    }

    /// bs58check encoding used as the sync document id
    pub fn to_bs58check(&self) -> String {
        bs58::encode(self.0.as_bytes()).with_check().into_string()
    }

    pub fn from_bs58check(s: &str) -> Result<Self, UserIdError> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| UserIdError::InvalidEncoding(e.to_string()))?;
        let bytes: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| UserIdError::InvalidLength(bytes.len()))?;
        Ok(Self(Uuid::from_bytes(bytes)))
    }

    /// Automerge URL of the namespace document
    pub fn to_url(&self) -> String {
        format!("{}{}", AUTOMERGE_URL_PREFIX, self.to_bs58check())
    }

    /// Parse either a UUID, a bs58check document id, or an automerge URL
    pub fn parse(s: &str) -> Result<Self, UserIdError> {
        let s = s.trim();
        if let Ok(uuid) = Uuid::parse_str(s) {
            return Ok(Self(uuid));
        }
        let encoded = s.strip_prefix(AUTOMERGE_URL_PREFIX).unwrap_or(s);
        Self::from_bs58check(encoded)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| UserIdError::InvalidUuid(s.to_string()))
    }
}
