//! Storage layer
//!
//! Handles Automerge document persistence and SQLite projection.
//!
//! ## Architecture
//!
//! - **Automerge**: source of truth, one binary file per namespace
//! - **SQLite**: read-optimized projection for sorted, limited list queries
//!
//! Whenever the Automerge document changes, the SQLite database is
//! rebuilt to match it.

pub mod error;
pub mod persistence;
pub mod projection;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use persistence::{atomic_write, AutomergePersistence};
pub use projection::{sort_column, SqliteProjection};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
