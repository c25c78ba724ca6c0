//! Error types for the fan-out layer.
//!
//! Broker failures are wrapped in [`FanoutError`] so callers can tell a
//! transient connection problem (worth retrying) from a configuration
//! mistake (fatal).

/// Errors that can occur in the fan-out layer.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// A Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The broker could not be reached even after retrying.
    #[error("broker connect failed after {attempts} attempts: {reason}")]
    Connect {
        /// Attempts made.
        attempts: u32,
        /// Final failure.
        reason: String,
    },

    /// The broker has been closed.
    #[error("broker is closed")]
    Closed,
}

impl FanoutError {
    /// Whether retrying the operation could succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}
