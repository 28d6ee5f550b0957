//! Errors surfaced by inventory actions
//!
//! Every failure a user can trigger maps to one variant with a message
//! fit to show as-is.

use thiserror::Error;
use uuid::Uuid;

use crate::document::DocumentError;
use crate::models::ValidationErrors;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

impl InventoryError {
    /// Whether the user can fix this by changing their input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            InventoryError::Validation(_)
                | InventoryError::ProductNotFound(_)
                | InventoryError::InsufficientStock { .. }
                | InventoryError::InvalidQuery(_)
                | InventoryError::Document(DocumentError::StockOutOfRange { .. })
        )
    }
}
