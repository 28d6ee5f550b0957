//! Per-peer sync state
//!
//! Remembering what each peer already has lets the next sync send only
//! new changes. Stored as JSON next to the namespace document.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use automerge::sync::State as AutomergeSyncState;
use tracing::warn;

use crate::storage::persistence::atomic_write;

#[derive(Debug, Default)]
pub struct SyncState {
    peers: HashMap<String, AutomergeSyncState>,
    path: Option<PathBuf>,
}

impl SyncState {
    /// In-memory state, never written to disk
    pub fn new() -> Self {
        Self::default()
    }

    /// State backed by a file, loading it if present
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let mut state = Self {
            peers: HashMap::new(),
            path: Some(path),
        };
        state.load()?;
        Ok(state)
    }

    pub fn get_or_create(&mut self, peer_id: &str) -> &mut AutomergeSyncState {
        self.peers.entry(peer_id.to_string()).or_default()
    }

    pub fn get(&self, peer_id: &str) -> Option<&AutomergeSyncState> {
        self.peers.get(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Forget every peer, forcing a full exchange next time
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let encoded: HashMap<&str, Vec<u8>> = self
            .peers
            .iter()
            .map(|(peer, state)| (peer.as_str(), state.encode()))
            .collect();
        let json = serde_json::to_vec(&encoded)?;

        atomic_write(path, &json)
            .with_context(|| format!("Failed to save sync state to {:?}", path))
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let json = fs::read(path)
            .with_context(|| format!("Failed to read sync state from {:?}", path))?;
        let encoded: HashMap<String, Vec<u8>> = serde_json::from_slice(&json)
            .with_context(|| format!("Invalid sync state in {:?}", path))?;

        for (peer, bytes) in encoded {
            match AutomergeSyncState::decode(&bytes) {
                Ok(state) => {
                    self.peers.insert(peer, state);
                }
                Err(e) => warn!("Dropping unreadable sync state for {}: {}", peer, e),
            }
        }
        Ok(())
    }
}
