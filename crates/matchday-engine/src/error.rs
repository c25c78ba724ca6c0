//! Error types for the match engine binary.
//!
//! [`EngineError`] covers startup failures (configuration, broker, server)
//! and the match lifecycle API. Errors returned from handlers render as
//! the same `{error, code, details?}` body the hub uses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use matchday_core::clock::SimulationError;
use matchday_core::repository::RepositoryError;
use matchday_types::MatchId;
use serde_json::{Value, json};

use crate::config::ConfigError;

/// Top-level error for the match engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The match cannot be simulated in its current state.
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The match store failed or has no such match.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A cancel request targeted a match this process is not running.
    #[error("match {0} is not running")]
    NotRunning(MatchId),

    /// A dependency's circuit breaker is open.
    #[error("circuit breaker is open for {key}")]
    CircuitOpen {
        /// Dependency key of the breaker.
        key: String,
        /// Milliseconds until the next trial call.
        retry_after_ms: u64,
    },

    /// Broker connection failed.
    #[error("fan-out error: {source}")]
    Fanout {
        /// The underlying fan-out error.
        #[from]
        source: matchday_fanout::FanoutError,
    },

    /// HTTP server failed to start.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: matchday_hub::ServerError,
    },
}

impl EngineError {
    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Simulation(_) => "INVALID_MATCH_STATE",
            Self::Repository(RepositoryError::NotFound(_)) => "MATCH_NOT_FOUND",
            Self::Repository(RepositoryError::Unavailable(_)) => "DEPENDENCY_UNAVAILABLE",
            Self::NotRunning(_) => "MATCH_NOT_RUNNING",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Config { .. } | Self::Fanout { .. } | Self::Server { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Simulation(_) | Self::NotRunning(_) => StatusCode::CONFLICT,
            Self::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Repository(RepositoryError::Unavailable(_)) | Self::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Config { .. } | Self::Fanout { .. } | Self::Server { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON error body.
    pub fn body(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        let details = match self {
            Self::CircuitOpen { key, retry_after_ms } => {
                Some(json!({ "dependency": key, "retryAfterMs": retry_after_ms }))
            }
            Self::Simulation(SimulationError::AlreadyLive(id)
            | SimulationError::AlreadyCompleted(id)
            | SimulationError::Postponed(id)
            | SimulationError::Abandoned(id))
            | Self::NotRunning(id)
            | Self::Repository(RepositoryError::NotFound(id)) => Some(json!({ "matchId": id })),
            _ => None,
        };
        if let (Some(details), Some(map)) = (details, body.as_object_mut()) {
            map.insert(String::from("details"), details);
        }
        body
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, code = self.code(), "Request failed");
        }
        (status, axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_conflicts_map_to_409_with_match_id() {
        let err = EngineError::from(SimulationError::AlreadyCompleted(MatchId::new("m-1")));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let body = err.body();
        assert_eq!(body["code"], "INVALID_MATCH_STATE");
        assert_eq!(body["error"], "match m-1 is already completed");
        assert_eq!(body["details"]["matchId"], "m-1");
    }

    #[test]
    fn missing_match_is_404() {
        let err = EngineError::from(RepositoryError::NotFound(MatchId::new("nope")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "MATCH_NOT_FOUND");
    }

    #[test]
    fn open_circuit_reports_retry_hint() {
        let err = EngineError::CircuitOpen {
            key: String::from("repository"),
            retry_after_ms: 1_500,
        };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = err.body();
        assert_eq!(body["error"], "circuit breaker is open for repository");
        assert_eq!(body["details"]["retryAfterMs"], 1_500);
    }

    #[test]
    fn unavailable_store_is_503_without_details() {
        let err = EngineError::from(RepositoryError::Unavailable(String::from("down")));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.body().get("details").is_none());
    }
}
