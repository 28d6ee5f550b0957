//! Sync with an automerge-repo sync server
//!
//! Each namespace document is synced under a document id derived from the
//! user id, so every device that uses the same id converges on the same
//! data.
//!
//! ## Protocol
//!
//! 1. Connect via WebSocket
//! 2. Exchange `join` / `peer` handshake messages
//! 3. Exchange Automerge sync messages until both sides are caught up
//!
//! Frames are CBOR encoded.

mod client;
mod message;
mod state;

pub use client::{SyncClient, SyncEvent, SyncStatus};
pub use message::{ClientMessage, ServerMessage};
pub use state::SyncState;
