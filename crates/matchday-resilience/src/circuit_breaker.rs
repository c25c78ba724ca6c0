//! Circuit breaker guarding calls to a flaky dependency.
//!
//! States move `Closed -> Open -> HalfOpen -> Closed`. Consecutive
//! failures reaching [`CircuitBreakerConfig::failure_threshold`] open the
//! circuit until `reset_timeout` has elapsed. While open, calls fail with
//! [`CircuitError::Open`] without running the wrapped future. The first
//! call at or after the deadline is a half-open trial: success closes the
//! circuit, failure re-opens it and restarts the timeout.
//!
//! Time is read from [`tokio::time::Instant`] so tests can pause and
//! advance the clock.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Thresholds for a [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial call, in milliseconds.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}
const fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl CircuitBreakerConfig {
    /// The open-state cooldown.
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through.
    Closed,
    /// Calls fail fast until the reset deadline.
    Open,
    /// A single trial call is in flight.
    HalfOpen,
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit is open; the wrapped function was not invoked.
    #[error("circuit breaker is open for {key} (retry in {retry_after:?})")]
    Open {
        /// Dependency key of the breaker.
        key: String,
        /// Time until the next trial is allowed.
        retry_after: Duration,
    },

    /// The wrapped function ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> CircuitError<E> {
    /// Whether this is a fail-fast rejection rather than a real failure.
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    next_attempt: Option<Instant>,
}

/// A per-dependency circuit breaker.
///
/// Obtain shared instances through
/// [`ResilienceRegistry::breaker`](crate::registry::ResilienceRegistry::breaker)
/// so every caller of one dependency sees the same state.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for the dependency `key`.
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                next_attempt: None,
            }),
        }
    }

    /// The dependency key this breaker guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Run `operation` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire::<E>()?;
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(CircuitError::Failed(error))
            }
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.next_attempt = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.lock();
        if inner.state == CircuitState::Closed {
            return Ok(());
        }

        // Open, or half-open with a trial in flight. A trial that never
        // reported back (its future was dropped) expires after one more
        // reset timeout.
        let now = Instant::now();
        match inner.next_attempt {
            Some(at) if now < at => Err(self.open_error(at.duration_since(now))),
            _ => {
                inner.state = CircuitState::HalfOpen;
                inner.next_attempt = Some(now + self.config.reset_timeout());
                info!(key = %self.key, "circuit half-open, allowing trial call");
                Ok(())
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(key = %self.key, "circuit closed after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.next_attempt = None;
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trip = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trip {
            inner.state = CircuitState::Open;
            inner.next_attempt = Some(Instant::now() + self.config.reset_timeout());
            warn!(
                key = %self.key,
                failures = inner.consecutive_failures,
                reset_timeout_ms = self.config.reset_timeout_ms,
                "circuit opened"
            );
        }
    }

    fn open_error<E>(&self, retry_after: Duration) -> CircuitError<E> {
        CircuitError::Open {
            key: self.key.clone(),
            retry_after,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "repository",
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout_ms: 1_000,
            },
        )
    }

    async fn failing(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), CircuitError<&'static str>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await
    }

    async fn succeeding(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<u8, CircuitError<&'static str>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(7)
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_fails_fast() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let err = failing(&breaker, &calls).await.unwrap_err();
            assert!(!err.is_open());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = failing(&breaker, &calls).await.unwrap_err();
        assert!(err.is_open());
        assert!(err.to_string().starts_with("circuit breaker is open"));
        // The wrapped function was not invoked a fourth time.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_after_reset_timeout_closes_on_success() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = failing(&breaker, &calls).await;
        }

        tokio::time::advance(Duration::from_millis(1_001)).await;

        assert_eq!(succeeding(&breaker, &calls).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_and_restarts_timeout() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = failing(&breaker, &calls).await;
        }

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let err = failing(&breaker, &calls).await.unwrap_err();
        assert!(!err.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(succeeding(&breaker, &calls).await.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_failures() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        let _ = failing(&breaker, &calls).await;
        let _ = failing(&breaker, &calls).await;
        let _ = succeeding(&breaker, &calls).await;
        let _ = failing(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);
    }
}
