use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifiers are opaque strings per spec.md §3.
macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(RoomId);
opaque_id!(CallId);
opaque_id!(UserId);
opaque_id!(PeerId);
/// Per-connection identity, distinct from `PeerId`: a reconnecting user gets
/// a new socket/connection id but keeps its `PeerId` (invariant P2).
opaque_id!(SocketId);

impl PeerId {
    /// Server-generated; clients never choose it (invariant P1).
    pub fn generate() -> Self {
        Self(format!("peer_{}", uuid::Uuid::new_v4().simple()))
    }
}

/// The guest `userId` prefix marker (invariant P3): guest transitions never
/// call the CallStore.
pub const GUEST_USER_PREFIX: &str = "guest:";

impl UserId {
    pub fn is_guest(&self) -> bool {
        self.0.starts_with(GUEST_USER_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    Moderator,
    Participant,
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Live,
    Ended,
}

/// `User` snapshot injected by the TokenVerifier; the session layer never
/// mutates it (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Tri-state media flags; `None` on an update means "retain prior value"
/// (spec.md §4.1 `updateMediaState`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    pub audio: bool,
    pub video: bool,
    pub screen: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaStateUpdate {
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
    pub screen_share_enabled: Option<bool>,
}

impl MediaState {
    pub fn apply(&mut self, update: &MediaStateUpdate) {
        if let Some(a) = update.audio_enabled {
            self.audio = a;
        }
        if let Some(v) = update.video_enabled {
            self.video = v;
        }
        if let Some(s) = update.screen_share_enabled {
            self.screen = s;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub peer_id: PeerId,
    pub user_id: UserId,
    pub socket_id: SocketId,
    pub user: UserSnapshot,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_connected: bool,
    pub media_state: MediaState,
    /// Bumped on every disconnect/reconnect so an in-flight reap timer can
    /// tell whether it is still looking at the disconnect it was scheduled
    /// for (spec.md §4.1 reap correctness, testable property 6).
    pub disconnect_epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub name: String,
    pub is_private: bool,
    pub max_participants: u32,
    /// Stored hashed-or-plain by the CallStore; compared constant-time
    /// (spec.md §9, Open Question 3).
    #[serde(skip_serializing)]
    pub passcode: Option<String>,
    pub invited_only: bool,
    #[serde(skip_serializing)]
    pub invited_user_ids: Vec<UserId>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_private: false,
            max_participants: 50,
            passcode: None,
            invited_only: false,
            invited_user_ids: Vec::new(),
        }
    }
}

/// A participant-facing snapshot, safe to serialize onto the wire (no
/// passcode, no invite list).
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSnapshot {
    pub peer_id: PeerId,
    pub user: UserSnapshot,
    pub role: ParticipantRole,
    pub is_connected: bool,
    pub media_state: MediaState,
}

impl From<&Participant> for ParticipantSnapshot {
    fn from(p: &Participant) -> Self {
        Self {
            peer_id: p.peer_id.clone(),
            user: p.user.clone(),
            role: p.role.clone(),
            is_connected: p.is_connected,
            media_state: p.media_state,
        }
    }
}
