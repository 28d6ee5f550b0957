//! Sync client
//!
//! One-shot WebSocket sync against an automerge-repo sync server: connect,
//! handshake, exchange Automerge sync messages until neither side has
//! anything left to send, disconnect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use automerge::sync::{Message as SyncMessage, SyncDoc};
use automerge::ChangeHash;
use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::message::{ClientMessage, PeerId, ServerMessage};
use super::state::SyncState;
use crate::document::InventoryDocument;
use crate::user_id::UserId;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Disconnected,
    Connecting,
    Connected,
    Syncing,
    Error,
}

/// Events emitted while syncing
#[derive(Debug, Clone)]
pub enum SyncEvent {
    StatusChanged(SyncStatus),
    /// Remote changes were merged into the local document
    DocumentUpdated,
    Error(String),
    PeerConnected(String),
}

/// Sync client for one namespace
pub struct SyncClient {
    url: String,
    user_id: UserId,
    peer_id: PeerId,
    status: watch::Sender<SyncStatus>,
    status_rx: watch::Receiver<SyncStatus>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    sync_state: Arc<Mutex<SyncState>>,
}

impl SyncClient {
    pub fn new(url: &str, user_id: UserId) -> Self {
        let (status_tx, status_rx) = watch::channel(SyncStatus::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let peer_id = format!("stockroom-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        Self {
            url: url.to_string(),
            user_id,
            peer_id,
            status: status_tx,
            status_rx,
            event_tx,
            event_rx: Some(event_rx),
            sync_state: Arc::new(Mutex::new(SyncState::new())),
        }
    }

    /// Use persisted per-peer state
    pub fn with_sync_state(mut self, state: SyncState) -> Self {
        self.sync_state = Arc::new(Mutex::new(state));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn status(&self) -> SyncStatus {
        *self.status_rx.borrow()
    }

    /// Take the event receiver (only once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Connect, sync, disconnect
    ///
    /// Returns whether the local document received remote changes.
    pub async fn sync_once(&self, doc: &mut InventoryDocument) -> Result<bool> {
        if *doc.user_id() != self.user_id {
            anyhow::bail!(
                "Sync client is for {}, document belongs to {}",
                self.user_id,
                doc.user_id()
            );
        }

        info!("Starting sync of {} with {}", self.user_id, self.url);
        self.set_status(SyncStatus::Connecting);

        let ws_stream = match connect_async(&self.url).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("Sync connection to {} failed: {}", self.url, e);
                self.set_status(SyncStatus::Error);
                self.emit(SyncEvent::Error(e.to_string()));
                return Err(e).with_context(|| format!("Failed to connect to {}", self.url));
            }
        };
        self.set_status(SyncStatus::Connected);

        let heads_before = heads(doc);
        let result = self.exchange(ws_stream, doc).await;
        let updated = heads(doc) != heads_before;

        match &result {
            Ok(()) => {
                self.set_status(SyncStatus::Disconnected);
                info!("Sync complete, document_updated={}", updated);
            }
            Err(e) => {
                self.set_status(SyncStatus::Error);
                self.emit(SyncEvent::Error(e.to_string()));
                warn!("Sync failed: {:#}", e);
            }
        }
        result?;

        if updated {
            self.emit(SyncEvent::DocumentUpdated);
        }
        Ok(updated)
    }

    async fn exchange(&self, ws_stream: WsStream, doc: &mut InventoryDocument) -> Result<()> {
        let (mut write, mut read) = ws_stream.split();
        self.set_status(SyncStatus::Syncing);

        send(&mut write, &ClientMessage::join(&self.peer_id)).await?;

        // Handshake: wait for the server's peer message
        let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;
        let server_peer_id = loop {
            let frame = tokio::time::timeout_at(deadline, read.next())
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "Timed out waiting for sync server at {}. Is it running?",
                        self.url
                    )
                })?;

            match frame {
                Some(Ok(Message::Binary(data))) => match ServerMessage::decode(&data) {
                    Ok(ServerMessage::Peer(peer)) => {
                        self.emit(SyncEvent::PeerConnected(peer.sender_id.clone()));
                        break peer.sender_id;
                    }
                    Ok(ServerMessage::Error(err)) => {
                        anyhow::bail!("Sync server error: {}", err.message)
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Ignoring undecodable frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    anyhow::bail!("Sync server at {} closed the connection", self.url)
                }
                Some(Err(e)) => anyhow::bail!("Sync connection error ({}): {}", self.url, e),
                Some(Ok(_)) => {}
            }
        };
        debug!("Handshake complete with {}", server_peer_id);

        // Opening message
        {
            let mut state = self.sync_state.lock().await;
            let peer_state = state.get_or_create(&server_peer_id);
            if let Some(msg) = doc.inner_mut().sync().generate_sync_message(peer_state) {
                let request =
                    ClientMessage::request(&self.peer_id, &server_peer_id, &self.user_id, msg.encode());
                send(&mut write, &request).await?;
            }
        }

        let deadline = tokio::time::Instant::now() + EXCHANGE_TIMEOUT;
        loop {
            let frame = match tokio::time::timeout_at(deadline, read.next()).await {
                Ok(frame) => frame,
                Err(_) => {
                    debug!("Sync exchange window elapsed");
                    break;
                }
            };

            match frame {
                Some(Ok(Message::Binary(data))) => match ServerMessage::decode(&data) {
                    Ok(ServerMessage::Sync(msg)) => {
                        if !self
                            .handle_sync_message(&msg.sender_id, &msg.data, doc, &mut write)
                            .await?
                        {
                            break;
                        }
                    }
                    Ok(ServerMessage::DocUnavailable(_)) => {
                        // Server has never seen this namespace: push ours
                        debug!("Server has no copy of {}, uploading", self.user_id);
                        let mut state = self.sync_state.lock().await;
                        let peer_state = state.get_or_create(&server_peer_id);
                        if let Some(msg) = doc.inner_mut().sync().generate_sync_message(peer_state) {
                            let sync = ClientMessage::sync(
                                &self.peer_id,
                                &server_peer_id,
                                &self.user_id,
                                msg.encode(),
                            );
                            send(&mut write, &sync).await?;
                        }
                    }
                    Ok(ServerMessage::Error(err)) => {
                        warn!("Sync server error: {}", err.message);
                        self.emit(SyncEvent::Error(err.message));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Ignoring undecodable frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => return Err(anyhow::anyhow!("WebSocket error: {}", e)),
                Some(Ok(_)) => {}
            }
        }

        if let Err(e) = self.sync_state.lock().await.save() {
            warn!("Failed to persist sync state: {:#}", e);
        }
        write.close().await.ok();
        Ok(())
    }

    /// Apply one incoming sync message and answer it
    ///
    /// Returns `false` once there is nothing left to send.
    async fn handle_sync_message<S>(
        &self,
        sender_id: &str,
        data: &[u8],
        doc: &mut InventoryDocument,
        write: &mut SplitSink<S, Message>,
    ) -> Result<bool>
    where
        S: Sink<Message> + Unpin,
        <S as Sink<Message>>::Error: std::error::Error + Send + Sync + 'static,
    {
        let sync_msg = match SyncMessage::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Skipping malformed sync payload from {}: {}", sender_id, e);
                return Ok(true);
            }
        };

        let mut state = self.sync_state.lock().await;
        let peer_state = state.get_or_create(sender_id);

        doc.inner_mut()
            .sync()
            .receive_sync_message(peer_state, sync_msg)
            .context("Failed to apply sync message")?;

        match doc.inner_mut().sync().generate_sync_message(peer_state) {
            Some(reply) => {
                let msg =
                    ClientMessage::sync(&self.peer_id, sender_id, &self.user_id, reply.encode());
                send(write, &msg).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_status(&self, status: SyncStatus) {
        let _ = self.status.send(status);
        self.emit(SyncEvent::StatusChanged(status));
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn send<S>(write: &mut SplitSink<S, Message>, msg: &ClientMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    <S as Sink<Message>>::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = msg.encode().context("Failed to encode sync message")?;
    write.send(Message::Binary(bytes)).await?;
    Ok(())
}

fn heads(doc: &mut InventoryDocument) -> Vec<ChangeHash> {
    doc.inner_mut().get_heads()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client() {
        let user = UserId::new();
        let client = SyncClient::new("ws://localhost:3030", user);

        assert_eq!(client.status(), SyncStatus::Disconnected);
        assert!(client.peer_id().starts_with("stockroom-"));
        assert_eq!(*client.user_id(), user);
    }

    #[test]
    fn test_peer_ids_differ() {
        let user = UserId::new();
        let a = SyncClient::new("ws://localhost:3030", user);
        let b = SyncClient::new("ws://localhost:3030", user);
        assert_ne!(a.peer_id(), b.peer_id());
    }

    #[tokio::test]
    async fn test_wrong_namespace_is_rejected() {
        let client = SyncClient::new("ws://localhost:1", UserId::new());
        let mut doc = InventoryDocument::new(UserId::new());

        let err = client.sync_once(&mut doc).await.unwrap_err();
        assert!(err.to_string().contains("belongs to"));
        assert_eq!(client.status(), SyncStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_unreachable_server_sets_error_status() {
        let mut client = SyncClient::new("ws://127.0.0.1:1", UserId::new());
        let mut events = client.take_events().unwrap();
        let user = *client.user_id();
        let mut doc = InventoryDocument::new(user);

        assert!(client.sync_once(&mut doc).await.is_err());
        assert_eq!(client.status(), SyncStatus::Error);

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SyncEvent::Error(_)) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
