//! Retry with exponential backoff.
//!
//! [`retry_with_backoff`] runs an async operation up to
//! [`RetryConfig::max_attempts`] times. After a retryable failure it waits
//! `min(max_delay, initial_delay * multiplier^(attempt - 1))`, optionally
//! scaled by a uniform jitter factor in `[0.5, 1.0)`. Each attempt is
//! bounded by [`RetryConfig::timeout_ms`]; a timed-out attempt counts as a
//! retryable failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

/// Lower bound of the jitter factor.
const JITTER_MIN: f64 = 0.5;

/// Upper bound (exclusive) of the jitter factor.
const JITTER_MAX: f64 = 1.0;

/// Backoff policy for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in `[0.5, 1.0)`.
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Per-attempt deadline in milliseconds (0 disables the deadline).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}
const fn default_initial_delay_ms() -> u64 {
    100
}
const fn default_max_delay_ms() -> u64 {
    5_000
}
const fn default_backoff_multiplier() -> f64 {
    2.0
}
const fn default_jitter() -> bool {
    true
}
const fn default_timeout_ms() -> u64 {
    10_000
}

impl RetryConfig {
    /// The per-attempt deadline, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Jitter is drawn from `rng` when enabled.
    pub fn backoff_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let max_delay = Duration::from_millis(self.max_delay_ms);
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let raw_ms = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let mut delay_ms = raw_ms.min(self.max_delay_ms as f64);

        if self.jitter {
            delay_ms *= rng.random_range(JITTER_MIN..JITTER_MAX);
        }

        let micros = (delay_ms * 1000.0).round();
        if !micros.is_finite() || micros < 0.0 {
            return max_delay;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_micros(micros as u64);
        delay.min(max_delay)
    }
}

/// Why a single attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptFailure<E> {
    /// The operation returned an error.
    #[error("{0}")]
    Failed(E),

    /// The operation did not finish within the per-attempt deadline.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Error returned by [`retry_with_backoff`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last failure.
    #[error("operation failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last: AttemptFailure<E>,
    },

    /// A non-retryable error stopped the loop early.
    #[error("non-retryable failure on attempt {attempt}: {error}")]
    Aborted {
        /// Attempt number that produced the error (1-based).
        attempt: u32,
        /// The error itself.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The last operation error, if the final failure was not a timeout.
    pub const fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted {
                last: AttemptFailure::Failed(e),
                ..
            }
            | Self::Aborted { error: e, .. } => Some(e),
            Self::Exhausted {
                last: AttemptFailure::TimedOut(_),
                ..
            } => None,
        }
    }
}

/// Run `operation` with retries according to `config`.
///
/// `is_retryable` decides whether an error is worth another attempt.
/// Timeouts are always retried.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: &RetryConfig,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);

        let outcome = match config.timeout() {
            Some(deadline) => tokio::time::timeout(deadline, operation()).await.ok(),
            None => Some(operation().await),
        };

        let failure = match outcome {
            Some(Ok(value)) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Some(Err(error)) => {
                if !is_retryable(&error) {
                    debug!(attempt, error = %error, "non-retryable failure");
                    return Err(RetryError::Aborted { attempt, error });
                }
                AttemptFailure::Failed(error)
            }
            None => AttemptFailure::TimedOut(Duration::from_millis(config.timeout_ms)),
        };

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %failure, "retries exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: failure,
            });
        }

        let delay = config.backoff_delay(attempt, &mut rand::rng());
        warn!(
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %failure,
            "attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_multiplier: 2.0,
            jitter: false,
            timeout_ms: 1_000,
        }
    }

    fn is_transient(e: &TestError) -> bool {
        *e == TestError::Transient
    }

    /// Fails with `Transient` for the first `failures` calls, then succeeds.
    fn flaky(calls: &Arc<AtomicU32>, failures: u32) -> impl FnMut() -> std::future::Ready<Result<&'static str, TestError>> {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                std::future::ready(Err(TestError::Transient))
            } else {
                std::future::ready(Ok("ok"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(&config(3), is_transient, flaky(&calls, 2)).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_with_aggregate_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(&config(2), is_transient, flaky(&calls, 2)).await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.last_error(), Some(&TestError::Transient));
        assert!(err.to_string().contains("after 2 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_aborts_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(&config(5), is_transient, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(TestError::Fatal))
        })
        .await;
        assert!(matches!(result, Err(RetryError::Aborted { attempt: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_retry() {
        let mut cfg = config(2);
        cfg.timeout_ms = 50;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), RetryError<TestError>> =
            retry_with_backoff(&cfg, is_transient, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: AttemptFailure::TimedOut(_)
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delay_grows_and_caps() {
        let cfg = config(10);
        let mut rng = rand::rng();
        let delays: Vec<u128> = (1..=5)
            .map(|a| cfg.backoff_delay(a, &mut rng).as_millis())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 100]);
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let mut cfg = config(10);
        cfg.jitter = true;
        let mut rng = rand::rng();
        for _ in 0..100 {
            let d = cfg.backoff_delay(3, &mut rng);
            assert!(d >= Duration::from_millis(20));
            assert!(d <= Duration::from_millis(40));
        }
    }
}
