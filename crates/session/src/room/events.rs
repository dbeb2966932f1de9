use super::{MediaState, ParticipantSnapshot, PeerId, RoomId, UserId};

/// Domain events the registry emits so the transport layer (`vidmesh-api`'s
/// `ws::dispatcher`) can broadcast without the registry itself knowing
/// anything about sockets or JSON framing (spec.md §6.1 names the wire
/// events these map onto: `participant:joined`, `participant:left`, etc).
#[derive(Debug, Clone)]
pub enum RoomEvent {
    UserJoined {
        room_id: RoomId,
        participant: ParticipantSnapshot,
    },
    UserLeft {
        room_id: RoomId,
        peer_id: PeerId,
        user_id: UserId,
        /// Distinguishes a voluntary leave from a reap-triggered one so
        /// clients can render "left" vs "connection lost" differently.
        reason: LeaveReason,
    },
    MediaStateChanged {
        room_id: RoomId,
        peer_id: PeerId,
        user_id: UserId,
        media_state: MediaState,
    },
    CallEnded {
        room_id: RoomId,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Voluntary,
    Disconnected,
}
