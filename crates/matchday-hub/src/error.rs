//! Error types for the broadcast hub.
//!
//! [`HubError`] covers admission failures (authentication, rate limits),
//! malformed client frames, and administrative request validation. The
//! same `{error, code, details}` body is used for HTTP responses (via
//! [`IntoResponse`]) and for `error` events pushed over a socket (via
//! [`HubError::to_frame`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use matchday_resilience::RateLimitExceeded;
use matchday_types::{RoomKeyError, SessionId};
use serde_json::{Value, json};

use crate::message::ServerMessage;

/// Errors that can occur in the hub layer.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The bearer token was missing or did not verify.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The caller exceeded a rate limit.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// A required payload field was missing or empty.
    #[error("{field} is required")]
    MissingField {
        /// Wire name of the field.
        field: &'static str,
    },

    /// A room key could not be parsed.
    #[error(transparent)]
    InvalidRoom(#[from] RoomKeyError),

    /// The event name is not one the hub handles.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The frame was not a JSON `{event, data}` object.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The session is not registered with this hub.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

impl HubError {
    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "AUTHENTICATION_FAILED",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::MissingField { .. } | Self::InvalidRoom(_) => "VALIDATION_FAILED",
            Self::UnknownEvent(_) => "UNKNOWN_EVENT",
            Self::InvalidFrame(_) => "INVALID_FRAME",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
        }
    }

    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingField { .. }
            | Self::InvalidRoom(_)
            | Self::UnknownEvent(_)
            | Self::InvalidFrame(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::RateLimited(e) => Some(json!({
                "limit": e.limit,
                "retryAfterMs": u64::try_from(e.retry_after.as_millis()).unwrap_or(u64::MAX),
            })),
            Self::MissingField { field } => Some(json!({ "field": field })),
            _ => None,
        }
    }

    /// The `{error, code, details?}` body.
    pub fn body(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let (Some(details), Some(map)) = (self.details(), body.as_object_mut()) {
            map.insert(String::from("details"), details);
        }
        body
    }

    /// The `error` event sent to a session.
    pub fn to_frame(&self) -> ServerMessage {
        ServerMessage::new("error", self.body())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = HubError::MissingField { field: "matchId" };
        let body = err.body();
        assert_eq!(body["error"], "matchId is required");
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "matchId");
    }

    #[test]
    fn authentication_message_prefix() {
        let err = HubError::Authentication(String::from("token expired"));
        assert!(err.to_string().starts_with("Authentication error: "));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.body().get("details").is_none());
    }

    #[test]
    fn frame_uses_error_event() {
        let frame = HubError::UnknownEvent(String::from("kick:off")).to_frame();
        assert_eq!(frame.event, "error");
        assert_eq!(frame.data["code"], "UNKNOWN_EVENT");
    }
}
