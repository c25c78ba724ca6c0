//! Ports to the services that own match records and standings.
//!
//! The simulation reads a match through [`MatchRepository`], writes
//! progress and the final record back through it, and reports finished
//! fixtures to a [`StandingsUpdater`]. The in-memory implementations back
//! single-node deployments and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use matchday_types::{MatchId, MatchResult, MatchState};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Errors from the match or standings stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// No match with this id exists.
    #[error("match not found: {0}")]
    NotFound(MatchId),

    /// The store could not be reached.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Whether retrying the call could succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Read and write access to match records.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Fetch a match by id.
    async fn get(&self, id: &MatchId) -> Result<MatchState, RepositoryError>;

    /// Persist the full match record.
    async fn save(&self, state: &MatchState) -> Result<(), RepositoryError>;
}

/// Consumer of finished match results.
#[async_trait]
pub trait StandingsUpdater: Send + Sync {
    /// Record a completed or abandoned match.
    async fn report(&self, result: &MatchResult) -> Result<(), RepositoryError>;
}

/// Match store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMatchRepository {
    matches: RwLock<BTreeMap<MatchId, MatchState>>,
}

impl InMemoryMatchRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a fixture, replacing any record with its id.
    pub async fn insert(&self, state: MatchState) {
        self.matches.write().await.insert(state.id.clone(), state);
    }

    /// Number of stored matches.
    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn get(&self, id: &MatchId) -> Result<MatchState, RepositoryError> {
        self.matches
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    async fn save(&self, state: &MatchState) -> Result<(), RepositoryError> {
        debug!(match_id = %state.id, minute = state.progress.minute, status = ?state.status, "Saving match");
        self.matches.write().await.insert(state.id.clone(), state.clone());
        Ok(())
    }
}

/// Standings port that logs and keeps every reported result.
#[derive(Debug, Default)]
pub struct StubStandingsUpdater {
    reported: Mutex<Vec<MatchResult>>,
}

impl StubStandingsUpdater {
    /// Create an updater with no results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results reported so far, oldest first.
    pub async fn reported(&self) -> Vec<MatchResult> {
        self.reported.lock().await.clone()
    }
}

#[async_trait]
impl StandingsUpdater for StubStandingsUpdater {
    async fn report(&self, result: &MatchResult) -> Result<(), RepositoryError> {
        info!(
            match_id = %result.match_id,
            home = %result.home_club,
            away = %result.away_club,
            home_score = result.home_score,
            away_score = result.away_score,
            "Match result reported to standings"
        );
        self.reported.lock().await.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::generator::test_support::fixture;

    #[tokio::test]
    async fn get_returns_saved_record() {
        let repo = InMemoryMatchRepository::new();
        let mut state = fixture("m-1");
        repo.insert(state.clone()).await;

        state.home_team.score = 2;
        repo.save(&state).await.unwrap();

        let loaded = repo.get(&MatchId::new("m-1")).await.unwrap();
        assert_eq!(loaded.home_team.score, 2);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn missing_match_is_not_found_and_not_transient() {
        let repo = InMemoryMatchRepository::new();
        let err = repo.get(&MatchId::new("nope")).await.unwrap_err();
        assert_eq!(err, RepositoryError::NotFound(MatchId::new("nope")));
        assert!(!err.is_transient());
        assert!(RepositoryError::Unavailable("timeout".into()).is_transient());
    }

    #[tokio::test]
    async fn stub_standings_records_results() {
        let standings = StubStandingsUpdater::new();
        let result = fixture("m-2").result();
        standings.report(&result).await.unwrap();
        assert_eq!(standings.reported().await, vec![result]);
    }
}
