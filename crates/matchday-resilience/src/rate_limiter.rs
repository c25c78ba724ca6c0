//! Fixed-window rate limiter.
//!
//! Each key gets a counter and a window reset instant. A call is admitted
//! while the counter is below `max_requests`; the counter resets once the
//! window has elapsed. State is process-local and best-effort: limiters in
//! different processes do not coordinate.

use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

/// Window and ceiling for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    /// Calls admitted per key per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

const fn default_max_requests() -> u32 {
    100
}
const fn default_window_ms() -> u64 {
    60_000
}

impl RateLimitConfig {
    /// A config admitting `max_requests` per `window`.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The window length.
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Counter state for one key.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRecord {
    /// Calls admitted in the current window.
    pub count: u32,
    /// When the current window ends.
    pub reset_at: Instant,
}

/// A call was rejected because its key is over the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {key}: {limit} calls per window, retry in {retry_after:?}")]
pub struct RateLimitExceeded {
    /// The limited key.
    pub key: String,
    /// The configured ceiling.
    pub limit: u32,
    /// Time until the window resets.
    pub retry_after: Duration,
}

/// Keyed fixed-window counter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    records: DashMap<String, RateLimitRecord>,
}

impl RateLimiter {
    /// Create a limiter with the given ceiling.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    /// The limiter's configuration.
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one call against `key`.
    ///
    /// Returns the number of calls still available in the window.
    pub fn check(&self, key: &str) -> Result<u32, RateLimitExceeded> {
        let now = Instant::now();
        let window = self.config.window();

        let mut record = self
            .records
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitRecord {
                count: 0,
                reset_at: now + window,
            });

        if now >= record.reset_at {
            record.count = 0;
            record.reset_at = now + window;
        }

        if record.count >= self.config.max_requests {
            debug!(key, limit = self.config.max_requests, "rate limit exceeded");
            return Err(RateLimitExceeded {
                key: key.to_owned(),
                limit: self.config.max_requests,
                retry_after: record.reset_at.saturating_duration_since(now),
            });
        }

        record.count = record.count.saturating_add(1);
        Ok(self.config.max_requests.saturating_sub(record.count))
    }

    /// Drop records whose window has ended.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, record| record.reset_at > now);
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(1)))
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_over_ceiling_until_window_resets() {
        let limiter = limiter();
        assert_eq!(limiter.check("10.0.0.1").unwrap(), 1);
        assert_eq!(limiter.check("10.0.0.1").unwrap(), 0);

        let err = limiter.check("10.0.0.1").unwrap_err();
        assert_eq!(err.limit, 2);
        assert!(err.retry_after <= Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check("10.0.0.1").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = limiter();
        let _ = limiter.check("a");
        let _ = limiter.check("a");
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_windows() {
        let limiter = limiter();
        let _ = limiter.check("a");
        assert_eq!(limiter.tracked_keys(), 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        limiter.purge_expired();
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
