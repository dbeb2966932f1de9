mod events;
mod registry;
mod types;

pub use events::{LeaveReason, RoomEvent};
pub use registry::{RoomRegistry, RoomSnapshot};
pub use types::{
    CallId, GUEST_USER_PREFIX, MediaState, MediaStateUpdate, Participant, ParticipantRole,
    ParticipantSnapshot, PeerId, RoomId, RoomSettings, RoomStatus, SocketId, UserId, UserSnapshot,
};
