//! Core signaling and SFU session logic: the `RoomRegistry`, `MediaSession`,
//! and the `CallStore`/`TokenVerifier` ports they depend on. Nothing in this
//! crate knows about HTTP, WebSockets, or MongoDB — `vidmesh-api` and
//! `vidmesh-db` wire concrete adapters into it.

pub mod auth;
pub mod call_store;
pub mod clock;
pub mod error;
pub mod media;
pub mod room;

pub use auth::{AuthError, TokenVerifier, VerifiedIdentity};
pub use call_store::{CallRecord, CallStore, CallStoreError, ParticipantStatus};
pub use clock::{system_clock, Clock, SystemClock};
pub use error::{ErrorPayload, SessionError, SessionResult};
