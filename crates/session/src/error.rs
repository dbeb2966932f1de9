use serde::Serialize;
use uuid::Uuid;

/// The error taxonomy surfaced to clients, spec.md §7. Every variant maps to
/// exactly one `code` value sent on the wire in an `error` event; `Internal`
/// additionally carries a correlation id that is logged alongside the
/// underlying cause but never serialized verbatim to the client.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("room not found")]
    RoomNotFound,
    #[error("invalid passcode")]
    InvalidPasscode,
    #[error("room is full")]
    RoomFull,
    #[error("user is not invited to this room")]
    NotInvited,
    #[error("call has already ended")]
    Ended,
    #[error("only the host may perform this action")]
    HostRequired,
    #[error("signaling target is unreachable")]
    PeerUnreachable,
    #[error("router cannot consume the requested producer")]
    Unconsumable,
    #[error("rate limited")]
    RateLimited,
    #[error("internal error (trace {trace_id})")]
    Internal {
        trace_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        let trace_id = Uuid::new_v4();
        let source = source.into();
        tracing::error!(%trace_id, %source, "internal session error");
        Self::Internal { trace_id, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::RoomNotFound => "RoomNotFound",
            Self::InvalidPasscode => "InvalidPasscode",
            Self::RoomFull => "RoomFull",
            Self::NotInvited => "NotInvited",
            Self::Ended => "Ended",
            Self::HostRequired => "HostRequired",
            Self::PeerUnreachable => "PeerUnreachable",
            Self::Unconsumable => "Unconsumable",
            Self::RateLimited => "RateLimited",
            Self::Internal { .. } => "Internal",
        }
    }

    /// The message safe to put on the wire — `Internal` never leaks its
    /// source, only the trace id a user can hand to support.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal { trace_id, .. } => {
                format!("internal error, trace id {trace_id}")
            }
            other => other.to_string(),
        }
    }
}

/// Wire payload for the `error` event (spec.md §6.1).
#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    pub code: &'static str,
}

impl From<&SessionError> for ErrorPayload {
    fn from(err: &SessionError) -> Self {
        Self {
            message: err.client_message(),
            code: err.code(),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
