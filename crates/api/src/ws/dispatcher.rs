use axum::extract::ws::Message;
use futures::SinkExt;
use tracing::{debug, warn};
use vidmesh_session::room::PeerId;

use super::storage::WsStorage;

/// Sends a JSON message to every peer in `peer_ids` that currently has a
/// live socket; peers with no socket (already disconnected, not yet reaped)
/// are silently skipped.
pub async fn broadcast(ws_storage: &WsStorage, peer_ids: &[PeerId], message: &serde_json::Value) {
    let text = serde_json::to_string(message).unwrap_or_default();

    for peer_id in peer_ids {
        let Some(sender) = ws_storage.get(peer_id) else {
            continue;
        };
        let mut guard = sender.lock().await;
        if let Err(e) = guard.send(Message::text(text.clone())).await {
            warn!(%peer_id, %e, "failed to send ws message");
        } else {
            debug!(%peer_id, "ws message sent");
        }
    }
}

pub async fn send_to_peer(ws_storage: &WsStorage, peer_id: &PeerId, message: &serde_json::Value) {
    broadcast(ws_storage, std::slice::from_ref(peer_id), message).await;
}
