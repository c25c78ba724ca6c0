//! Resilience primitives for the Matchday services.
//!
//! - [`retry`] -- retry an async operation with exponential backoff,
//!   jitter, and a per-attempt deadline.
//! - [`circuit_breaker`] -- fail fast while a dependency is unhealthy.
//! - [`rate_limiter`] -- fixed-window admission control per key.
//! - [`registry`] -- keyed singletons for breakers and limiters, built
//!   once at startup and injected where needed.
//!
//! All timing uses [`tokio::time`], so tests run with a paused clock.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState};
pub use rate_limiter::{RateLimitConfig, RateLimitExceeded, RateLimitRecord, RateLimiter};
pub use registry::{ResilienceConfig, ResilienceRegistry};
pub use retry::{AttemptFailure, RetryConfig, RetryError, retry_with_backoff};
