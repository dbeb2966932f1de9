use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use mediasoup::rtp_parameters::MediaKind;
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use vidmesh_session::auth::VerifiedIdentity;
use vidmesh_session::error::SessionError;
use vidmesh_session::media::{ProducerSource, TransportDirection};
use vidmesh_session::room::{
    MediaStateUpdate, PeerId, RoomEvent, RoomId, RoomSettings, SocketId, UserSnapshot,
};

use crate::state::AppState;
use crate::ws::dispatcher;
use crate::ws::protocol::{ClientMessage, ServerMessage};
use crate::ws::storage::WsSender;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Handshake: verifies the token before the upgrade completes (spec.md
/// §4.2), gated by `AuthRateLimiter` keyed on the remote address rather than
/// a global tower middleware (spec.md §5's injectable-clock requirement).
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let key = remote_addr.ip().to_string();

    if state.auth_rate_limiter.is_limited(&key) {
        return (StatusCode::TOO_MANY_REQUESTS, "too many authentication attempts").into_response();
    }

    let identity = match state.token_verifier.verify(&params.token).await {
        Ok(identity) => identity,
        Err(_) => {
            state.auth_rate_limiter.record_failure(&key);
            return (StatusCode::UNAUTHORIZED, "authentication failed").into_response();
        }
    };
    state.auth_rate_limiter.clear(&key);

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// What this connection currently participates in. Shared between the
/// read loop (the only writer) and the room-event relay task (reader only)
/// so the relay can tell which events are this socket's own business and,
/// per testable property 5, which ones it caused itself.
#[derive(Default)]
struct ConnState {
    room_id: Option<RoomId>,
    peer_id: Option<PeerId>,
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: VerifiedIdentity) {
    info!(user_id = %identity.user_id, "signaling socket connected");

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));
    let conn_state = Arc::new(Mutex::new(ConnState::default()));

    let relay_handle = spawn_room_event_relay(state.clone(), sender.clone(), conn_state.clone());

    let ctx = Ctx {
        state: state.clone(),
        identity,
        conn_state: conn_state.clone(),
        sender: sender.clone(),
    };

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
                match parsed {
                    Ok(message) => {
                        if let Err(err) = ctx.dispatch(message).await {
                            ctx.reply(&ServerMessage::Error((&err).into())).await;
                        }
                    }
                    Err(e) => {
                        warn!(%e, "unrecognized signaling message");
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(%e, "signaling socket error");
                break;
            }
            _ => {}
        }
    }

    relay_handle.abort();
    ctx.cleanup().await;
}

/// Bundles everything a single inbound message needs to handle itself:
/// identity (authoritative `from`/`userId`), the connection's current
/// room/peer, and where to write direct replies.
struct Ctx {
    state: AppState,
    identity: VerifiedIdentity,
    conn_state: Arc<Mutex<ConnState>>,
    sender: WsSender,
}

impl Ctx {
    async fn reply(&self, message: &ServerMessage) {
        send_direct(&self.sender, message).await;
    }

    async fn current(&self) -> Result<(RoomId, PeerId), SessionError> {
        let guard = self.conn_state.lock().await;
        match (&guard.room_id, &guard.peer_id) {
            (Some(room_id), Some(peer_id)) => Ok((room_id.clone(), peer_id.clone())),
            _ => Err(SessionError::PeerUnreachable),
        }
    }

    fn user_snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            email: self.identity.email.clone(),
            avatar_url: None,
        }
    }

    async fn cleanup(&self) {
        let (room_id, peer_id) = {
            let mut guard = self.conn_state.lock().await;
            (guard.room_id.take(), guard.peer_id.take())
        };
        let (Some(room_id), Some(peer_id)) = (room_id, peer_id) else {
            return;
        };
        self.state.ws_storage.remove(&peer_id, &self.sender);
        self.state.media_session.leave_sfu(&room_id, &peer_id).await;
        if let Err(e) = self.state.room_registry.handle_disconnect(&room_id, &peer_id).await {
            warn!(%e, "handle_disconnect failed during cleanup");
        }
        info!(%room_id, %peer_id, "signaling socket disconnected");
    }

    async fn dispatch(&self, message: ClientMessage) -> Result<(), SessionError> {
        match message {
            ClientMessage::RoomJoin { room_id, passcode } => self.on_room_join(room_id, passcode).await,
            ClientMessage::RoomCreate {
                name,
                is_private,
                max_participants,
                id,
                passcode,
            } => self.on_room_create(name, is_private, max_participants, id, passcode).await,
            ClientMessage::RoomLeave { room_id } => self.on_room_leave(room_id).await,
            ClientMessage::RoomEndCall { room_id } => self.on_room_end_call(room_id).await,
            ClientMessage::ParticipantUpdateMediaState {
                video_enabled,
                audio_enabled,
                screen_share_enabled,
            } => {
                self.on_update_media_state(MediaStateUpdate {
                    audio_enabled,
                    video_enabled,
                    screen_share_enabled,
                })
                .await
            }
            ClientMessage::WebrtcOffer { to, offer } => self.on_webrtc_relay(to, RelayKind::Offer(offer)).await,
            ClientMessage::WebrtcAnswer { to, answer } => {
                self.on_webrtc_relay(to, RelayKind::Answer(answer)).await
            }
            ClientMessage::WebrtcIceCandidate { to, candidate } => {
                self.on_webrtc_relay(to, RelayKind::IceCandidate(candidate)).await
            }
            ClientMessage::WebrtcGetIceServers => self.on_get_ice_servers().await,
            ClientMessage::SfuJoinRoom { room_id } => self.on_sfu_join_room(room_id).await,
            ClientMessage::SfuCreateTransport { direction } => self.on_sfu_create_transport(direction).await,
            ClientMessage::SfuConnectTransport { dtls_parameters } => {
                self.on_sfu_connect_transport(dtls_parameters).await
            }
            ClientMessage::SfuProduce {
                kind,
                rtp_parameters,
                source,
            } => self.on_sfu_produce(kind, rtp_parameters, source).await,
            ClientMessage::SfuConsume {
                producer_id,
                rtp_capabilities,
            } => self.on_sfu_consume(producer_id, rtp_capabilities).await,
            ClientMessage::SfuResumeConsumer { consumer_id } => {
                self.on_sfu_resume_consumer(consumer_id).await
            }
            ClientMessage::SfuPauseProducer { pause } => self.on_sfu_pause_producer(pause).await,
            ClientMessage::ChatMessage { message, to } => self.on_chat_message(message, to).await,
            ClientMessage::ChatTyping { is_typing } => self.on_chat_typing(is_typing).await,
            ClientMessage::AdminGetRoomStats { room_id } => self.on_admin_room_stats(room_id).await,
            ClientMessage::AdminGetAllRooms => self.on_admin_all_rooms().await,
        }
    }

    async fn on_room_join(&self, room_id: String, passcode: Option<String>) -> Result<(), SessionError> {
        let room_id = RoomId::new(room_id);
        let user = self.user_snapshot();
        let socket_id = SocketId::new(uuid::Uuid::new_v4().to_string());

        let (peer_id, snapshot) = self
            .state
            .room_registry
            .join(&room_id, user.clone(), socket_id, passcode.as_deref())
            .await?;

        self.bind(&room_id, &peer_id).await;

        self.reply(&ServerMessage::RoomJoined {
            room_id: room_id.to_string(),
            user,
            participants: snapshot.participants,
            settings: snapshot.settings,
            is_host: snapshot.is_host,
        })
        .await;
        Ok(())
    }

    async fn on_room_create(
        &self,
        name: String,
        is_private: bool,
        max_participants: Option<u32>,
        id: Option<String>,
        passcode: Option<String>,
    ) -> Result<(), SessionError> {
        let room_id = RoomId::new(id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
        let settings = RoomSettings {
            name: name.clone(),
            is_private,
            max_participants: max_participants.unwrap_or(50),
            passcode,
            invited_only: false,
            invited_user_ids: Vec::new(),
        };
        let host = self.user_snapshot();
        let socket_id = SocketId::new(uuid::Uuid::new_v4().to_string());

        let (peer_id, snapshot) = self
            .state
            .room_registry
            .start_call(&room_id, host, socket_id, settings)
            .await?;

        self.bind(&room_id, &peer_id).await;

        self.reply(&ServerMessage::RoomCreated {
            id: room_id.to_string(),
            name,
            is_private,
            max_participants: snapshot.settings.max_participants,
        })
        .await;
        Ok(())
    }

    async fn bind(&self, room_id: &RoomId, peer_id: &PeerId) {
        let mut guard = self.conn_state.lock().await;
        guard.room_id = Some(room_id.clone());
        guard.peer_id = Some(peer_id.clone());
        drop(guard);
        self.state.ws_storage.add(peer_id.clone(), self.sender.clone());
    }

    async fn on_room_leave(&self, room_id: Option<String>) -> Result<(), SessionError> {
        let (current_room, peer_id) = self.current().await?;
        let room_id = room_id.map(RoomId::new).unwrap_or(current_room);

        self.state.room_registry.leave(&room_id, &peer_id).await?;
        self.state.media_session.leave_sfu(&room_id, &peer_id).await;
        self.state.ws_storage.remove(&peer_id, &self.sender);

        let mut guard = self.conn_state.lock().await;
        guard.room_id = None;
        guard.peer_id = None;
        Ok(())
    }

    async fn on_room_end_call(&self, room_id: String) -> Result<(), SessionError> {
        let (_, peer_id) = self.current().await?;
        let room_id = RoomId::new(room_id);
        self.state.room_registry.end_call(&room_id, &peer_id).await?;
        self.state.media_session.close_room(&room_id).await;
        Ok(())
    }

    async fn on_update_media_state(&self, update: MediaStateUpdate) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        self.state
            .room_registry
            .update_media_state(&room_id, &peer_id, update)
            .await?;
        Ok(())
    }

    async fn on_webrtc_relay(&self, to: String, kind: RelayKind) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let target = PeerId::new(to.clone());
        let exists = self
            .state
            .room_registry
            .participant_of(&room_id, &target)
            .await
            .is_some();

        if !exists {
            return match kind {
                // ICE candidates to a peer who already left are routine
                // churn, not an error (spec.md §4.2).
                RelayKind::IceCandidate(_) => Ok(()),
                _ => Err(SessionError::PeerUnreachable),
            };
        }

        let from = peer_id.to_string();
        let message = match kind {
            RelayKind::Offer(offer) => ServerMessage::WebrtcOffer { from, to, offer },
            RelayKind::Answer(answer) => ServerMessage::WebrtcAnswer { from, to, answer },
            RelayKind::IceCandidate(candidate) => {
                ServerMessage::WebrtcIceCandidate { from, to, candidate }
            }
        };
        self.send_to(&target, &message).await;
        Ok(())
    }

    async fn on_get_ice_servers(&self) -> Result<(), SessionError> {
        let turn = &self.state.settings.turn;
        let mut ice_servers = Vec::new();
        if let Some(stun) = &turn.stun_server {
            ice_servers.push(serde_json::json!({ "urls": stun }));
        }
        if let Some(turn_url) = &turn.turn_server_url {
            ice_servers.push(serde_json::json!({
                "urls": turn_url,
                "username": turn.turn_server_username,
                "credential": turn.turn_server_credential,
            }));
        }
        self.reply(&ServerMessage::WebrtcIceServers { ice_servers }).await;
        Ok(())
    }

    async fn on_sfu_join_room(&self, room_id: String) -> Result<(), SessionError> {
        let (bound_room, peer_id) = self.current().await?;
        let room_id = if bound_room.as_str() == room_id.as_str() { bound_room } else { RoomId::new(room_id) };

        let rtp_capabilities = self.state.media_session.join_sfu(&room_id, &peer_id).await?;
        self.reply(&ServerMessage::SfuRouterRtpCapabilities { rtp_capabilities })
            .await;

        for (other_peer, producer_id, kind, source) in
            self.state.media_session.other_producer_ids(&room_id, &peer_id).await
        {
            self.reply(&ServerMessage::SfuNewProducer {
                peer_id: other_peer.to_string(),
                producer_id: producer_id.to_string(),
                kind,
                source,
            })
            .await;
        }
        Ok(())
    }

    async fn on_sfu_create_transport(&self, direction: String) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let direction = match direction.as_str() {
            "send" => TransportDirection::Send,
            "recv" => TransportDirection::Recv,
            other => return Err(SessionError::internal(anyhow::anyhow!("unknown transport direction: {other}"))),
        };

        let params = self
            .state
            .media_session
            .create_transport(&room_id, &peer_id, direction)
            .await?;

        self.reply(&ServerMessage::SfuTransportCreated {
            id: params.transport_id.to_string(),
            ice_parameters: serde_json::to_value(&params.ice_parameters).map_err(SessionError::internal)?,
            ice_candidates: serde_json::to_value(&params.ice_candidates).map_err(SessionError::internal)?,
            dtls_parameters: serde_json::to_value(&params.dtls_parameters).map_err(SessionError::internal)?,
        })
        .await;
        Ok(())
    }

    async fn on_sfu_connect_transport(
        &self,
        dtls_parameters: mediasoup::data_structures::DtlsParameters,
    ) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        self.state
            .media_session
            .connect_transport(&room_id, &peer_id, None, dtls_parameters)
            .await?;
        self.reply(&ServerMessage::SfuTransportConnected).await;
        Ok(())
    }

    async fn on_sfu_produce(
        &self,
        kind: MediaKind,
        rtp_parameters: mediasoup::rtp_parameters::RtpParameters,
        source: Option<ProducerSource>,
    ) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let source = source.unwrap_or(match kind {
            MediaKind::Audio => ProducerSource::Microphone,
            MediaKind::Video => ProducerSource::Camera,
        });

        let producer_id = self
            .state
            .media_session
            .produce(&room_id, &peer_id, kind, rtp_parameters, source)
            .await?;

        self.reply(&ServerMessage::SfuProducerCreated { id: producer_id.to_string() })
            .await;

        if let Some(snapshot) = self.state.room_registry.room_of(&room_id).await {
            let others: Vec<PeerId> = snapshot
                .participants
                .into_iter()
                .map(|p| p.peer_id)
                .filter(|p| p != &peer_id)
                .collect();
            let event = ServerMessage::SfuNewProducer {
                peer_id: peer_id.to_string(),
                producer_id: producer_id.to_string(),
                kind,
                source,
            };
            self.broadcast(&others, &event).await;
        }
        Ok(())
    }

    async fn on_sfu_consume(
        &self,
        producer_id: String,
        rtp_capabilities: mediasoup::rtp_parameters::RtpCapabilities,
    ) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let parsed_producer_id = producer_id
            .parse()
            .map_err(|_| SessionError::internal(anyhow::anyhow!("malformed producer id: {producer_id}")))?;

        let producer_peer_id = self
            .state
            .media_session
            .other_producer_ids(&room_id, &peer_id)
            .await
            .into_iter()
            .find(|(_, pid, _, _)| *pid == parsed_producer_id)
            .map(|(owner, _, _, _)| owner)
            .unwrap_or_else(|| PeerId::new(""));

        let (consumer_id, kind, rtp_parameters) = self
            .state
            .media_session
            .consume(&room_id, &peer_id, parsed_producer_id, rtp_capabilities)
            .await?;

        self.reply(&ServerMessage::SfuConsumerCreated {
            id: consumer_id.to_string(),
            producer_id,
            kind,
            rtp_parameters,
            producer_peer_id: producer_peer_id.to_string(),
        })
        .await;
        Ok(())
    }

    async fn on_sfu_resume_consumer(&self, consumer_id: String) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let parsed = consumer_id
            .parse()
            .map_err(|_| SessionError::internal(anyhow::anyhow!("malformed consumer id: {consumer_id}")))?;
        self.state.media_session.resume_consumer(&room_id, &peer_id, parsed).await?;
        self.reply(&ServerMessage::SfuConsumerResumed { consumer_id }).await;
        Ok(())
    }

    async fn on_sfu_pause_producer(&self, pause: bool) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let producer_id = self
            .state
            .media_session
            .set_producer_paused(&room_id, &peer_id, None, pause)
            .await?;
        self.reply(&ServerMessage::SfuProducerPaused {
            producer_id: producer_id.to_string(),
            paused: pause,
        })
        .await;
        Ok(())
    }

    async fn on_chat_message(&self, message: String, to: Option<String>) -> Result<(), SessionError> {
        let (room_id, peer_id) = self.current().await?;
        let user = self
            .state
            .room_registry
            .participant_of(&room_id, &peer_id)
            .await
            .map(|p| p.user)
            .unwrap_or_else(|| self.user_snapshot());

        let event = ServerMessage::ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            from: peer_id.to_string(),
            user,
            message,
            created_at: chrono::Utc::now(),
        };

        match to {
            Some(to) => {
                let target = PeerId::new(to);
                if self.state.room_registry.participant_of(&room_id, &target).await.is_none() {
                    return Err(SessionError::PeerUnreachable);
                }
                self.send_to(&target, &event).await;
            }
            None => {
                if let Some(snapshot) = self.state.room_registry.room_of(&room_id).await {
                    let others: Vec<PeerId> = snapshot
                        .participants
                        .into_iter()
                        .map(|p| p.peer_id)
                        .filter(|p| p != &peer_id)
                        .collect();
                    self.broadcast(&others, &event).await;
                }
            }
        }
        Ok(())
    }

    async fn on_chat_typing(&self, is_typing: bool) -> Result<(), SessionError> {
        let Ok((room_id, peer_id)) = self.current().await else {
            return Ok(());
        };
        let Some(snapshot) = self.state.room_registry.room_of(&room_id).await else {
            return Ok(());
        };
        let others: Vec<PeerId> = snapshot
            .participants
            .into_iter()
            .map(|p| p.peer_id)
            .filter(|p| p != &peer_id)
            .collect();
        let event = ServerMessage::ChatTyping {
            from: peer_id.to_string(),
            is_typing,
        };
        self.broadcast(&others, &event).await;
        Ok(())
    }

    async fn on_admin_room_stats(&self, room_id: String) -> Result<(), SessionError> {
        let room_id = RoomId::new(room_id);
        let snapshot = self
            .state
            .room_registry
            .room_of(&room_id)
            .await
            .ok_or(SessionError::RoomNotFound)?;
        self.reply(&ServerMessage::AdminRoomStats {
            room_id: room_id.to_string(),
            status: snapshot.status,
            participant_count: snapshot.participants.len(),
        })
        .await;
        Ok(())
    }

    async fn on_admin_all_rooms(&self) -> Result<(), SessionError> {
        let rooms = self
            .state
            .room_registry
            .all_rooms()
            .await
            .into_iter()
            .map(|s| {
                serde_json::json!({
                    "roomId": s.room_id.to_string(),
                    "status": s.status,
                    "participantCount": s.participants.len(),
                })
            })
            .collect();
        self.reply(&ServerMessage::AdminAllRooms { rooms }).await;
        Ok(())
    }

    async fn send_to(&self, target: &PeerId, message: &ServerMessage) {
        let Ok(value) = serde_json::to_value(message) else { return };
        dispatcher::send_to_peer(&self.state.ws_storage, target, &value).await;
    }

    async fn broadcast(&self, targets: &[PeerId], message: &ServerMessage) {
        let Ok(value) = serde_json::to_value(message) else { return };
        dispatcher::broadcast(&self.state.ws_storage, targets, &value).await;
    }
}

enum RelayKind {
    Offer(serde_json::Value),
    Answer(serde_json::Value),
    IceCandidate(serde_json::Value),
}

async fn send_direct(sender: &WsSender, message: &ServerMessage) {
    let Ok(text) = serde_json::to_string(message) else { return };
    let mut guard = sender.lock().await;
    let _ = guard.send(Message::text(text)).await;
}

/// Turns `RoomRegistry`'s transport-agnostic `RoomEvent` broadcast into wire
/// messages for this one connection, applying testable property 5 ("no
/// broadcast to self") to every variant except `CallEnded`, which per the
/// `room:end-call` scenario must reach every peer including the one who
/// called it.
fn spawn_room_event_relay(
    state: AppState,
    sender: WsSender,
    conn_state: Arc<Mutex<ConnState>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = state.room_registry.subscribe();
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let (my_room, my_peer) = {
                let guard = conn_state.lock().await;
                (guard.room_id.clone(), guard.peer_id.clone())
            };
            let Some(my_room) = my_room else { continue };

            let outgoing = match event {
                RoomEvent::UserJoined { room_id, participant } => {
                    if room_id != my_room || Some(&participant.peer_id) == my_peer.as_ref() {
                        continue;
                    }
                    ServerMessage::RoomUserJoined {
                        user: participant.user.clone(),
                        participant,
                    }
                }
                RoomEvent::UserLeft { room_id, peer_id, user_id, .. } => {
                    if room_id != my_room || Some(&peer_id) == my_peer.as_ref() {
                        continue;
                    }
                    ServerMessage::RoomUserLeft {
                        user_id: user_id.to_string(),
                        peer_id: peer_id.to_string(),
                    }
                }
                RoomEvent::MediaStateChanged { room_id, peer_id, user_id, media_state } => {
                    if room_id != my_room || Some(&peer_id) == my_peer.as_ref() {
                        continue;
                    }
                    ServerMessage::ParticipantMediaStateChanged {
                        user_id: user_id.to_string(),
                        peer_id: peer_id.to_string(),
                        media_state,
                    }
                }
                RoomEvent::CallEnded { room_id, reason } => {
                    if room_id != my_room {
                        continue;
                    }
                    ServerMessage::RoomCallEnded { room_id: room_id.to_string(), reason }
                }
            };
            send_direct(&sender, &outgoing).await;
        }
    })
}
