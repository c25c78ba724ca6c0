//! Process-wide registry of keyed breakers and limiters.
//!
//! The registry is constructed once at startup and injected into whatever
//! needs it. Asking for the same key twice returns the same stateful
//! instance, so every caller of one dependency shares one breaker.
//! Each instance guards only its own counters; the maps are sharded.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::RetryConfig;

/// Defaults handed out by a [`ResilienceRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResilienceConfig {
    /// Retry policy for outbound calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Breaker thresholds used by [`ResilienceRegistry::breaker`].
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Keyed singletons for circuit breakers and rate limiters.
#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    config: ResilienceConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl ResilienceRegistry {
    /// Create an empty registry.
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            limiters: DashMap::new(),
        }
    }

    /// Retry policy for outbound calls.
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// The breaker for `key`, created with the default thresholds.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(key, &self.config.circuit_breaker)
    }

    /// The breaker for `key`, created with `config` on first use.
    ///
    /// `config` is ignored when the breaker already exists.
    pub fn breaker_with(&self, key: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let entry = self
            .breakers
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config.clone())));
        Arc::clone(entry.value())
    }

    /// The limiter for `key`, created with `config` on first use.
    ///
    /// `config` is ignored when the limiter already exists.
    pub fn limiter(&self, key: &str, config: &RateLimitConfig) -> Arc<RateLimiter> {
        let entry = self
            .limiters
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(RateLimiter::new(config.clone())));
        Arc::clone(entry.value())
    }

    /// Drop expired windows from every limiter.
    pub fn purge_expired(&self) {
        for limiter in &self.limiters {
            limiter.value().purge_expired();
        }
    }

    /// Tear down every breaker and limiter.
    pub fn shutdown(&self) {
        info!(
            breakers = self.breakers.len(),
            limiters = self.limiters.len(),
            "Resilience registry shutting down"
        );
        self.breakers.clear();
        self.limiters.clear();
    }
}
