//! Collaborative document rooms.
//!
//! A [`Room`] multiplexes every connection naming it onto one shared
//! replicated document. The document itself is an opaque replication
//! capability: this module applies remote updates, hands a full snapshot to
//! joining peers, and relays updates between peers. It never interprets
//! update contents or resolves conflicts.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ServerError;
use crate::store::{StoreError, UpdateStore};

/// Broadcast capacity per room; peers that lag past this drop updates and
/// must rejoin for a fresh snapshot.
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// The opaque replicated document state: an ordered log of updates, which is
/// exactly what the wire protocol relays and the store persists.
#[derive(Debug, Default)]
pub struct ReplicatedDoc {
    updates: Vec<Vec<u8>>,
}

impl ReplicatedDoc {
    pub fn apply_update(&mut self, update: Vec<u8>) {
        self.updates.push(update);
    }

    /// Full history, in order, for bringing a joining peer up to date.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.updates.clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }
}

/// One update travelling through a room's broadcast channel.
#[derive(Debug, Clone)]
struct RoomUpdate {
    source: Uuid,
    data: Vec<u8>,
}

/// A named collaborative-document instance shared by all connections
/// addressing it. Rooms live for the process lifetime.
pub struct Room {
    name: String,
    store: UpdateStore,
    doc: parking_lot::RwLock<ReplicatedDoc>,
    /// Guards the one-time history replay. False until the first
    /// `ensure_loaded` completes; the async mutex serialises racing first
    /// accesses.
    ready: tokio::sync::Mutex<bool>,
    update_tx: broadcast::Sender<RoomUpdate>,
}

impl Room {
    pub fn new(name: impl Into<String>, store: UpdateStore) -> Self {
        let (update_tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            store,
            doc: parking_lot::RwLock::new(ReplicatedDoc::default()),
            ready: tokio::sync::Mutex::new(false),
            update_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_count(&self) -> usize {
        self.doc.read().update_count()
    }

    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.doc.read().snapshot()
    }

    /// Replay persisted history into the in-memory document, exactly once.
    ///
    /// A missing log is normal for a new room. Any other failure marks the
    /// room ready anyway: it starts from live state rather than refusing
    /// service over possibly-corrupt history.
    pub async fn ensure_loaded(&self) -> Result<(), ServerError> {
        let mut ready = self.ready.lock().await;
        if *ready {
            return Ok(());
        }
        let result = match self.store.load_all().await {
            Ok(updates) => {
                let count = updates.len();
                let mut doc = self.doc.write();
                for update in updates {
                    doc.apply_update(update);
                }
                tracing::info!(room = %self.name, updates = count, "replayed persisted history");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(source) => Err(ServerError::RoomLoad {
                room: self.name.clone(),
                source,
            }),
        };
        *ready = true;
        result
    }

    /// Apply one update: record it in the document, persist it, and fan it
    /// out to every other peer.
    pub async fn apply_update(&self, source: Uuid, data: Vec<u8>) {
        self.doc.write().apply_update(data.clone());
        if let Err(e) = self.store.append(&data).await {
            tracing::warn!(room = %self.name, error = %e, "failed to persist update");
        }
        let _ = self.update_tx.send(RoomUpdate { source, data });
    }

    /// Drive one peer connection until it disconnects.
    ///
    /// The joining peer first receives the full snapshot, then updates from
    /// other peers as they arrive; its own binary frames are applied to the
    /// shared document.
    pub async fn attach(self: &Arc<Self>, socket: WebSocket) {
        let peer = Uuid::new_v4();
        let mut update_rx = self.update_tx.subscribe();
        let (mut ws_tx, mut ws_rx) = socket.split();

        tracing::debug!(room = %self.name, %peer, "peer joined");

        let snapshot = self.doc.read().snapshot();
        for update in snapshot {
            if ws_tx.send(Message::Binary(update)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            self.apply_update(peer, data).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(room = %self.name, %peer, error = %e, "peer socket error");
                            break;
                        }
                    }
                }
                update = update_rx.recv() => {
                    match update {
                        Ok(update) if update.source != peer => {
                            if ws_tx.send(Message::Binary(update.data)).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(room = %self.name, %peer, missed, "peer lagged behind room updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        tracing::debug!(room = %self.name, %peer, "peer left");
    }
}
