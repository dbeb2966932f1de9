use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use vidmesh_session::room::PeerId;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Tracks the live socket for every connected peer. Grounded on the
/// teacher's `WsStorage` (`ws/storage.rs`), keyed on `PeerId` rather than
/// `ObjectId` and holding a single sender per peer rather than a `Vec`:
/// invariant P2 (reconnect keeps the same `PeerId`) means a fresh
/// connection under that id is a replacement, not an additional tab.
pub struct WsStorage {
    connections: DashMap<PeerId, WsSender>,
}

impl WsStorage {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn add(&self, peer_id: PeerId, sender: WsSender) {
        self.connections.insert(peer_id, sender);
    }

    pub fn remove(&self, peer_id: &PeerId, sender: &WsSender) {
        if let Some(entry) = self.connections.get(peer_id) {
            if Arc::ptr_eq(&entry, sender) {
                drop(entry);
                self.connections.remove(peer_id);
            }
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<WsSender> {
        self.connections.get(peer_id).map(|s| s.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for WsStorage {
    fn default() -> Self {
        Self::new()
    }
}
