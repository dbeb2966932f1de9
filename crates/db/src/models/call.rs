use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Durable call document, grounded on the teacher's `Conference`
/// (`models/conference.rs`), pared to the fields `CallStore` actually
/// needs and re-keyed on the opaque string ids used throughout
/// `vidmesh-session` rather than `ObjectId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<bson::oid::ObjectId>,
    pub call_id: String,
    pub room_id: String,
    pub host_user_id: String,
    pub started_at: DateTime,
    pub ended_at: Option<DateTime>,
}

impl CallDocument {
    pub const COLLECTION: &'static str = "calls";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatusDocument {
    Joined,
    Left,
}

/// Grounded on `Conference`'s embedded-participant shape, split into its own
/// collection here since `add_participant`/`update_participant_status` are
/// independently idempotent upserts (no array-filter update needed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParticipantDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<bson::oid::ObjectId>,
    pub call_id: String,
    pub user_id: String,
    pub display_name: String,
    pub status: ParticipantStatusDocument,
    pub joined_at: DateTime,
    pub left_at: Option<DateTime>,
}

impl CallParticipantDocument {
    pub const COLLECTION: &'static str = "call_participants";
}
