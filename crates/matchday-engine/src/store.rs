//! Resilient access to the match and standings stores.
//!
//! Every call goes through a circuit breaker from the shared registry and,
//! inside it, through retry with backoff for transient failures. A missing
//! match is an answer, not a failure, so it never counts against the
//! breaker.

use std::future::Future;
use std::sync::Arc;

use matchday_core::repository::{MatchRepository, RepositoryError, StandingsUpdater};
use matchday_resilience::{
    AttemptFailure, CircuitBreaker, CircuitError, ResilienceRegistry, RetryConfig, RetryError,
    retry_with_backoff,
};
use matchday_types::{MatchId, MatchResult, MatchState};

use crate::error::EngineError;

/// Breaker key for the match store.
pub const MATCHES_BREAKER_KEY: &str = "repository:matches";

/// Breaker key for the standings service.
pub const STANDINGS_BREAKER_KEY: &str = "repository:standings";

/// Match and standings stores behind retry and circuit breaking.
pub struct MatchStore {
    matches: Arc<dyn MatchRepository>,
    standings: Arc<dyn StandingsUpdater>,
    retry: RetryConfig,
    matches_breaker: Arc<CircuitBreaker>,
    standings_breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for MatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchStore")
            .field("matches_breaker", &self.matches_breaker.state())
            .field("standings_breaker", &self.standings_breaker.state())
            .finish_non_exhaustive()
    }
}

impl MatchStore {
    /// Wrap both stores with breakers and retry policy from `registry`.
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        standings: Arc<dyn StandingsUpdater>,
        registry: &ResilienceRegistry,
    ) -> Self {
        Self {
            matches,
            standings,
            retry: registry.retry_config().clone(),
            matches_breaker: registry.breaker(MATCHES_BREAKER_KEY),
            standings_breaker: registry.breaker(STANDINGS_BREAKER_KEY),
        }
    }

    /// Fetch a match record.
    pub async fn load(&self, id: &MatchId) -> Result<MatchState, EngineError> {
        let found = guarded(&self.matches_breaker, &self.retry, || async move {
            match self.matches.get(id).await {
                Ok(state) => Ok(Some(state)),
                Err(RepositoryError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?;
        found.ok_or_else(|| RepositoryError::NotFound(id.clone()).into())
    }

    /// Persist a match record.
    pub async fn save(&self, state: &MatchState) -> Result<(), EngineError> {
        guarded(&self.matches_breaker, &self.retry, || self.matches.save(state)).await
    }

    /// Hand a final result to the standings service.
    pub async fn report(&self, result: &MatchResult) -> Result<(), EngineError> {
        guarded(&self.standings_breaker, &self.retry, || self.standings.report(result)).await
    }
}

async fn guarded<T, F, Fut>(
    breaker: &CircuitBreaker,
    retry: &RetryConfig,
    operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    breaker
        .call(|| retry_with_backoff(retry, RepositoryError::is_transient, operation))
        .await
        .map_err(flatten)
}

fn flatten(err: CircuitError<RetryError<RepositoryError>>) -> EngineError {
    match err {
        CircuitError::Open { key, retry_after } => EngineError::CircuitOpen {
            key,
            retry_after_ms: u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
        },
        CircuitError::Failed(
            RetryError::Aborted { error, .. }
            | RetryError::Exhausted {
                last: AttemptFailure::Failed(error),
                ..
            },
        ) => EngineError::Repository(error),
        CircuitError::Failed(RetryError::Exhausted {
            attempts,
            last: AttemptFailure::TimedOut(after),
        }) => EngineError::Repository(RepositoryError::Unavailable(format!(
            "timed out after {attempts} attempts of {after:?}"
        ))),
    }
}
