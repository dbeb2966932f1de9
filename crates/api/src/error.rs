use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use vidmesh_session::auth::AuthError;
use vidmesh_session::error::SessionError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
    RateLimited(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", msg),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => ApiError::Unauthorized("missing token".to_string()),
            AuthError::Invalid => ApiError::Unauthorized("invalid or expired token".to_string()),
        }
    }
}

impl From<&SessionError> for ApiError {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::AuthenticationFailed => {
                ApiError::Unauthorized(err.client_message())
            }
            SessionError::RoomNotFound => ApiError::NotFound(err.client_message()),
            SessionError::InvalidPasscode | SessionError::NotInvited => {
                ApiError::Forbidden(err.client_message())
            }
            SessionError::RoomFull | SessionError::Ended => {
                ApiError::Conflict(err.client_message())
            }
            SessionError::HostRequired => ApiError::Forbidden(err.client_message()),
            SessionError::PeerUnreachable | SessionError::Unconsumable => {
                ApiError::BadRequest(err.client_message())
            }
            SessionError::RateLimited => ApiError::RateLimited(err.client_message()),
            SessionError::Internal { .. } => ApiError::Internal(err.client_message()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::from(&err)
    }
}
