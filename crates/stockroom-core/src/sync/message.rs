//! Wire messages for the automerge-repo sync protocol
//!
//! Every frame is a CBOR map with a `type` tag. Only the handful of message
//! types needed for a one-shot sync are modelled; anything else the server
//! sends decodes as [`ServerMessage::Other`] and is ignored.

use serde::{Deserialize, Serialize};

use crate::user_id::UserId;

pub type PeerId = String;

/// The only protocol version spoken
pub const PROTOCOL_V1: &str = "1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMetadata {
    #[serde(default)]
    pub storage_id: Option<String>,
    #[serde(default)]
    pub is_ephemeral: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    pub sender_id: PeerId,
    pub peer_metadata: PeerMetadata,
    pub supported_protocol_versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessage {
    pub sender_id: PeerId,
    pub target_id: PeerId,
    #[serde(default)]
    pub peer_metadata: PeerMetadata,
    pub selected_protocol_version: String,
}

/// Automerge sync bytes addressed to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMessage {
    pub sender_id: PeerId,
    pub target_id: PeerId,
    pub document_id: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocUnavailableMessage {
    pub sender_id: PeerId,
    pub target_id: PeerId,
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(default)]
    pub sender_id: Option<PeerId>,
    #[serde(default)]
    pub target_id: Option<PeerId>,
    pub message: String,
}

/// Messages sent to the sync server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join(JoinMessage),
    /// First exchange for a document the server may not have yet
    #[serde(rename = "request")]
    Request(DocumentMessage),
    #[serde(rename = "sync")]
    Sync(DocumentMessage),
}

/// Messages received from the sync server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "peer")]
    Peer(PeerMessage),
    #[serde(rename = "sync")]
    Sync(DocumentMessage),
    #[serde(rename = "doc-unavailable")]
    DocUnavailable(DocUnavailableMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
    #[serde(other)]
    Other,
}

impl ClientMessage {
    pub fn join(sender_id: &str) -> Self {
        ClientMessage::Join(JoinMessage {
            sender_id: sender_id.to_string(),
            peer_metadata: PeerMetadata::default(),
            supported_protocol_versions: vec![PROTOCOL_V1.to_string()],
        })
    }

    pub fn request(sender_id: &str, target_id: &str, user_id: &UserId, data: Vec<u8>) -> Self {
        ClientMessage::Request(DocumentMessage::new(sender_id, target_id, user_id, data))
    }

    pub fn sync(sender_id: &str, target_id: &str, user_id: &UserId, data: Vec<u8>) -> Self {
        ClientMessage::Sync(DocumentMessage::new(sender_id, target_id, user_id, data))
    }

    /// Encode to CBOR
    pub fn encode(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)?;
        Ok(bytes)
    }
}

impl DocumentMessage {
    fn new(sender_id: &str, target_id: &str, user_id: &UserId, data: Vec<u8>) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            target_id: target_id.to_string(),
            document_id: user_id.to_bs58check(),
            data,
        }
    }
}

impl ServerMessage {
    /// Decode from CBOR
    pub fn decode(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}
