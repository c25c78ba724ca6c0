//! Hub settings from the `hub` section of `matchday-config.yaml`.

use matchday_resilience::RateLimitConfig;
use serde::Deserialize;

/// Admission and delivery settings for a [`BroadcastHub`].
///
/// [`BroadcastHub`]: crate::hub::BroadcastHub
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HubConfig {
    /// Shared secret for HS256 bearer tokens.
    #[serde(default)]
    pub jwt_secret: String,

    /// Connection attempts admitted per remote address.
    #[serde(default = "default_connection_limit")]
    pub connection_limit: RateLimitConfig,

    /// Messages admitted per session and event name.
    #[serde(default = "default_message_limit")]
    pub message_limit: RateLimitConfig,

    /// Outbound frames queued per session before new ones are dropped.
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,

    /// Key the connection limit on the first `x-forwarded-for` hop.
    /// Only enable behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            connection_limit: default_connection_limit(),
            message_limit: default_message_limit(),
            session_buffer: default_session_buffer(),
            trust_forwarded_for: false,
        }
    }
}

fn default_connection_limit() -> RateLimitConfig {
    RateLimitConfig {
        max_requests: 20,
        window_ms: 60_000,
    }
}

fn default_message_limit() -> RateLimitConfig {
    RateLimitConfig {
        max_requests: 30,
        window_ms: 1_000,
    }
}

const fn default_session_buffer() -> usize {
    256
}
