use mediasoup::data_structures::DtlsParameters;
use mediasoup::rtp_parameters::{MediaKind, RtpCapabilities, RtpParameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vidmesh_session::error::ErrorPayload;
use vidmesh_session::media::ProducerSource;
use vidmesh_session::room::{ParticipantSnapshot, RoomSettings, RoomStatus, UserSnapshot};

/// Inbound event envelope: `{ "type": "<spec.md §6.1 event name>", "data": {...} }`.
/// Grounded on the teacher's flat `{type, data}` dispatch shape
/// (`api/src/ws/handler.rs::handle_client_message`).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "room:join")]
    RoomJoin { room_id: String, passcode: Option<String> },
    #[serde(rename = "room:create")]
    RoomCreate {
        name: String,
        #[serde(default)]
        is_private: bool,
        max_participants: Option<u32>,
        id: Option<String>,
        /// Not in the literal wire list spec.md §6.1 gives for `room:create`;
        /// added because nothing else in this socket-only service can ever
        /// populate `RoomSettings::passcode` otherwise (room provisioning via
        /// the tenant REST API is out of scope, SPEC_FULL.md §13).
        #[serde(default)]
        passcode: Option<String>,
    },
    #[serde(rename = "room:leave")]
    RoomLeave { room_id: Option<String> },
    #[serde(rename = "room:end-call")]
    RoomEndCall { room_id: String },
    #[serde(rename = "participant:update-media-state")]
    ParticipantUpdateMediaState {
        video_enabled: Option<bool>,
        audio_enabled: Option<bool>,
        screen_share_enabled: Option<bool>,
    },
    #[serde(rename = "webrtc:offer")]
    WebrtcOffer { to: String, offer: Value },
    #[serde(rename = "webrtc:answer")]
    WebrtcAnswer { to: String, answer: Value },
    #[serde(rename = "webrtc:ice-candidate")]
    WebrtcIceCandidate { to: String, candidate: Value },
    #[serde(rename = "webrtc:get-ice-servers")]
    WebrtcGetIceServers,
    #[serde(rename = "sfu:join-room")]
    SfuJoinRoom { room_id: String },
    #[serde(rename = "sfu:create-transport")]
    SfuCreateTransport { direction: String },
    #[serde(rename = "sfu:connect-transport")]
    SfuConnectTransport { dtls_parameters: DtlsParameters },
    #[serde(rename = "sfu:produce")]
    SfuProduce {
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        #[serde(default)]
        source: Option<ProducerSource>,
    },
    #[serde(rename = "sfu:consume")]
    SfuConsume {
        producer_id: String,
        rtp_capabilities: RtpCapabilities,
    },
    #[serde(rename = "sfu:resume-consumer")]
    SfuResumeConsumer { consumer_id: String },
    #[serde(rename = "sfu:pause-producer")]
    SfuPauseProducer { pause: bool },
    #[serde(rename = "chat:message")]
    ChatMessage { message: String, to: Option<String> },
    #[serde(rename = "chat:typing")]
    ChatTyping { is_typing: bool },
    #[serde(rename = "admin:get-room-stats")]
    AdminGetRoomStats { room_id: String },
    #[serde(rename = "admin:get-all-rooms")]
    AdminGetAllRooms,
}

/// Outbound event envelope, same `{type, data}` shape.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "room:created")]
    RoomCreated {
        id: String,
        name: String,
        is_private: bool,
        max_participants: u32,
    },
    #[serde(rename = "room:joined")]
    RoomJoined {
        room_id: String,
        user: UserSnapshot,
        participants: Vec<ParticipantSnapshot>,
        settings: RoomSettings,
        is_host: bool,
    },
    #[serde(rename = "room:user-joined")]
    RoomUserJoined {
        user: UserSnapshot,
        participant: ParticipantSnapshot,
    },
    #[serde(rename = "room:user-left")]
    RoomUserLeft { user_id: String, peer_id: String },
    #[serde(rename = "room:call-ended")]
    RoomCallEnded { room_id: String, reason: String },
    #[serde(rename = "participant:media-state-changed")]
    ParticipantMediaStateChanged {
        user_id: String,
        peer_id: String,
        media_state: vidmesh_session::room::MediaState,
    },
    #[serde(rename = "webrtc:offer")]
    WebrtcOffer { from: String, to: String, offer: Value },
    #[serde(rename = "webrtc:answer")]
    WebrtcAnswer { from: String, to: String, answer: Value },
    #[serde(rename = "webrtc:ice-candidate")]
    WebrtcIceCandidate { from: String, to: String, candidate: Value },
    #[serde(rename = "webrtc:ice-servers")]
    WebrtcIceServers { ice_servers: Vec<Value> },
    #[serde(rename = "sfu:router-rtp-capabilities")]
    SfuRouterRtpCapabilities { rtp_capabilities: RtpCapabilities },
    #[serde(rename = "sfu:transport-created")]
    SfuTransportCreated {
        id: String,
        ice_parameters: Value,
        ice_candidates: Value,
        dtls_parameters: Value,
    },
    #[serde(rename = "sfu:transport-connected")]
    SfuTransportConnected,
    #[serde(rename = "sfu:producer-created")]
    SfuProducerCreated { id: String },
    #[serde(rename = "sfu:consumer-created")]
    SfuConsumerCreated {
        id: String,
        producer_id: String,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        producer_peer_id: String,
    },
    #[serde(rename = "sfu:consumer-resumed")]
    SfuConsumerResumed { consumer_id: String },
    #[serde(rename = "sfu:producer-paused")]
    SfuProducerPaused { producer_id: String, paused: bool },
    #[serde(rename = "sfu:new-producer")]
    SfuNewProducer {
        peer_id: String,
        producer_id: String,
        kind: MediaKind,
        source: ProducerSource,
    },
    #[serde(rename = "chat:message")]
    ChatMessage {
        id: String,
        room_id: String,
        from: String,
        user: UserSnapshot,
        message: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },
    #[serde(rename = "chat:typing")]
    ChatTyping { from: String, is_typing: bool },
    #[serde(rename = "admin:room-stats")]
    AdminRoomStats {
        room_id: String,
        status: RoomStatus,
        participant_count: usize,
    },
    #[serde(rename = "admin:all-rooms")]
    AdminAllRooms { rooms: Vec<Value> },
    #[serde(rename = "error")]
    Error(ErrorPayload),
}
