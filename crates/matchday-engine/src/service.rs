//! Match lifecycle: start, cancel, look up.
//!
//! [`MatchService`] owns one task per live match. Each task runs a fresh
//! [`SimulationClock`] in paced mode with a [`ChannelSink`]; an
//! [`UpdateRelay`] drains the sink into the match room and the store.
//! When the clock stops the task writes the final record, reports the
//! result to standings, and frees the match id.
//!
//! A match id is registered in `running` before its task is spawned and
//! removed only after the final record is written, so two concurrent
//! start requests for the same fixture cannot both succeed.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use matchday_core::clock::{ChannelSink, MatchControl, SimulationClock, SimulationError};
use matchday_core::config::SimulationConfig;
use matchday_core::generator::EventGenerator;
use matchday_hub::BroadcastHub;
use matchday_types::{MatchId, MatchResult, MatchState, MatchStatus};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::broadcaster::{UpdateRelay, closing_update, publish_update};
use crate::error::EngineError;
use crate::store::MatchStore;

/// Starts, cancels and looks up matches.
#[derive(Debug)]
pub struct MatchService {
    store: Arc<MatchStore>,
    hub: Arc<BroadcastHub>,
    simulation: SimulationConfig,
    running: DashMap<MatchId, Arc<MatchControl>>,
    tasks: Mutex<JoinSet<()>>,
}

impl MatchService {
    /// Create a service simulating with `simulation` settings.
    pub fn new(store: Arc<MatchStore>, hub: Arc<BroadcastHub>, simulation: SimulationConfig) -> Self {
        Self {
            store,
            hub,
            simulation,
            running: DashMap::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Current record of a match.
    pub async fn get(&self, id: &MatchId) -> Result<MatchState, EngineError> {
        self.store.load(id).await
    }

    /// Kick off a scheduled match in paced mode.
    ///
    /// Returns as soon as the match task is spawned.
    ///
    /// # Errors
    ///
    /// [`EngineError::Repository`] if the match does not exist,
    /// [`EngineError::Simulation`] if it is not `scheduled` or already
    /// running here.
    pub async fn start(self: &Arc<Self>, id: &MatchId) -> Result<(), EngineError> {
        let state = self.store.load(id).await?;
        let control = self.claim(&state)?;

        let service = Arc::clone(self);
        let mut tasks = self.lock_tasks();
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "Match task panicked");
            }
        }
        tasks.spawn(async move { service.run_paced(state, control).await });
        Ok(())
    }

    /// Simulate a scheduled match to full time without pausing.
    ///
    /// Followers of the room receive a single closing update.
    pub async fn simulate_now(&self, id: &MatchId) -> Result<MatchState, EngineError> {
        let mut state = self.store.load(id).await?;
        let _control = self.claim(&state)?;

        let outcome = self.clock().simulate(&mut state);
        self.running.remove(id);
        let result = outcome?;

        publish_update(&self.hub, &closing_update(&state));
        self.finish(&state, &result).await?;
        Ok(state)
    }

    /// Ask a running match to stop at the next minute boundary.
    ///
    /// The match ends `abandoned`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Repository`] if the match does not exist,
    /// [`EngineError::NotRunning`] if it exists but is not live here.
    pub async fn cancel(&self, id: &MatchId) -> Result<(), EngineError> {
        let control = self.running.get(id).map(|entry| Arc::clone(entry.value()));
        if let Some(control) = control {
            control.cancel();
            info!(match_id = %id, "Cancellation requested");
            return Ok(());
        }
        self.store.load(id).await?;
        Err(EngineError::NotRunning(id.clone()))
    }

    /// Number of matches simulating on this process.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Cancel every running match and wait for their final records.
    pub async fn shutdown(&self) {
        for entry in &self.running {
            entry.value().cancel();
        }
        self.drain().await;
    }

    /// Wait until every spawned match task has finished.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        info!(matches = tasks.len(), "Waiting for match tasks");
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Match task panicked");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Match tasks
    // -----------------------------------------------------------------------

    /// Reserve `state`'s id for one simulation.
    fn claim(&self, state: &MatchState) -> Result<Arc<MatchControl>, EngineError> {
        if let Some(err) = SimulationError::not_startable(&state.id, state.status) {
            return Err(err.into());
        }
        match self.running.entry(state.id.clone()) {
            Entry::Occupied(_) => Err(SimulationError::AlreadyLive(state.id.clone()).into()),
            Entry::Vacant(slot) => {
                let control = Arc::new(MatchControl::new());
                slot.insert(Arc::clone(&control));
                Ok(control)
            }
        }
    }

    fn clock(&self) -> SimulationClock {
        SimulationClock::new(
            EventGenerator::from_config(self.simulation.clone()),
            self.simulation.minute_interval(),
        )
    }

    async fn run_paced(self: Arc<Self>, mut state: MatchState, control: Arc<MatchControl>) {
        let match_id = state.id.clone();
        let (sink, updates) = ChannelSink::channel(self.simulation.update_buffer);
        let relay = UpdateRelay::new(Arc::clone(&self.hub), Arc::clone(&self.store));
        let relay = tokio::spawn(relay.run(state.clone(), updates));

        let outcome = self
            .clock()
            .simulate_realtime(&mut state, &sink, &control)
            .await;

        // Closing the sink ends the relay once it has drained.
        drop(sink);
        if let Err(e) = relay.await {
            error!(match_id = %match_id, error = %e, "Update relay panicked");
        }

        match outcome {
            Ok(result) => {
                if result.status == MatchStatus::Abandoned {
                    publish_update(&self.hub, &closing_update(&state));
                }
                if let Err(e) = self.finish(&state, &result).await {
                    error!(match_id = %match_id, error = %e, "Final record not stored");
                }
            }
            Err(e) => warn!(match_id = %match_id, error = %e, "Match did not kick off"),
        }

        self.running.remove(&match_id);
    }

    async fn finish(&self, state: &MatchState, result: &MatchResult) -> Result<(), EngineError> {
        self.store.save(state).await?;
        self.store.report(result).await?;
        info!(
            match_id = %result.match_id,
            status = ?result.status,
            home = result.home_score,
            away = result.away_score,
            "Result recorded"
        );
        Ok(())
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use matchday_core::repository::{
        InMemoryMatchRepository, MatchRepository, StandingsUpdater, StubStandingsUpdater,
    };
    use matchday_hub::{HubConfig, ServerMessage};
    use matchday_resilience::{ResilienceConfig, ResilienceRegistry};
    use matchday_types::{ClubId, RoomKey, TeamSheet, UserId};
    use tokio::sync::mpsc;

    use super::*;

    struct Harness {
        service: Arc<MatchService>,
        repo: Arc<InMemoryMatchRepository>,
        standings: Arc<StubStandingsUpdater>,
        hub: Arc<BroadcastHub>,
    }

    async fn harness() -> Harness {
        let registry = ResilienceRegistry::new(ResilienceConfig::default());
        let repo = Arc::new(InMemoryMatchRepository::new());
        let standings = Arc::new(StubStandingsUpdater::new());
        let hub = Arc::new(BroadcastHub::new("node-test", HubConfig::default(), &registry));
        let store = Arc::new(MatchStore::new(
            Arc::clone(&repo) as Arc<dyn MatchRepository>,
            Arc::clone(&standings) as Arc<dyn StandingsUpdater>,
            &registry,
        ));
        let simulation = SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        };
        repo.insert(MatchState::scheduled(
            MatchId::new("m-1"),
            TeamSheet::new(ClubId::new("rovers")),
            TeamSheet::new(ClubId::new("united")),
            chrono::Utc::now(),
        ))
        .await;
        Harness {
            service: Arc::new(MatchService::new(store, Arc::clone(&hub), simulation)),
            repo,
            standings,
            hub,
        }
    }

    fn follow(hub: &BroadcastHub, id: &str) -> mpsc::Receiver<ServerMessage> {
        let (session, rx) = hub.connect(UserId::new("fan"));
        hub.join(session, &RoomKey::for_match(&MatchId::new(id))).unwrap();
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn paced_match_runs_to_full_time_and_reports() {
        let h = harness().await;
        let id = MatchId::new("m-1");
        let mut rx = follow(&h.hub, "m-1");

        h.service.start(&id).await.unwrap();
        assert_eq!(h.service.running_count(), 1);

        h.service.drain().await;

        let saved = h.repo.get(&id).await.unwrap();
        assert_eq!(saved.status, MatchStatus::Completed);
        assert_eq!(saved.progress.minute, 90);
        assert_eq!(h.service.running_count(), 0);

        let reported = h.standings.reported().await;
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].home_score, saved.home_team.score);

        let mut updates = 0;
        while let Ok(frame) = rx.try_recv() {
            if frame.event == "match:update" {
                updates += 1;
            }
        }
        assert_eq!(updates, 90);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_live() {
        let h = harness().await;
        let id = MatchId::new("m-1");

        h.service.start(&id).await.unwrap();
        let err = h.service.start(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Simulation(SimulationError::AlreadyLive(_))));

        h.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn completed_match_cannot_restart() {
        let h = harness().await;
        let id = MatchId::new("m-1");

        let finished = h.service.simulate_now(&id).await.unwrap();
        assert_eq!(finished.status, MatchStatus::Completed);

        let err = h.service.start(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Simulation(SimulationError::AlreadyCompleted(_))));
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_and_notifies_followers() {
        let h = harness().await;
        let id = MatchId::new("m-1");
        let mut rx = follow(&h.hub, "m-1");

        h.service.start(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        h.service.cancel(&id).await.unwrap();
        h.service.shutdown().await;

        let saved = h.repo.get(&id).await.unwrap();
        assert_eq!(saved.status, MatchStatus::Abandoned);
        assert!(saved.progress.minute < 90);

        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            if frame.event == "match:update" {
                last = Some(frame);
            }
        }
        assert_eq!(last.unwrap().data["state"]["status"], "abandoned");
        assert_eq!(h.standings.reported().await[0].status, MatchStatus::Abandoned);
    }

    #[tokio::test]
    async fn cancel_distinguishes_unknown_from_idle() {
        let h = harness().await;

        let err = h.service.cancel(&MatchId::new("ghost")).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);

        let err = h.service.cancel(&MatchId::new("m-1")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotRunning(_)));
    }

    #[tokio::test]
    async fn batch_run_leaves_no_claim_behind() {
        let h = harness().await;
        let id = MatchId::new("m-1");
        h.service.simulate_now(&id).await.unwrap();
        assert!(h.service.simulate_now(&id).await.is_err());
        assert_eq!(h.service.running_count(), 0);
    }
}
