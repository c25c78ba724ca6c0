//! Minute-by-minute match driver.
//!
//! [`SimulationClock`] runs a match through regulation time in one of two
//! modes:
//!
//! - **Batch** ([`SimulationClock::simulate`]): every minute back to back,
//!   no suspension. Used for fixtures nobody is watching.
//! - **Paced** ([`SimulationClock::simulate_realtime`]): after each minute
//!   the update is handed to a [`MinuteCallback`], then the clock sleeps
//!   for the configured interval. Minute `k + 1` never starts before the
//!   callback for minute `k` has returned.
//!
//! A [`MatchControl`] handle lets another task cancel a paced match. The
//! flag is checked at every minute boundary and also wakes the sleep, so
//! cancellation takes effect within one minute at most.
//!
//! A clock drives exactly one match: `idle -> running -> completed`, or
//! `cancelled` when stopped early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use matchday_types::{
    HomeAway, MatchId, MatchResult, MatchState, MatchStatus, MinuteUpdate, REGULATION_MINUTES,
    StatusTransitionError,
};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use crate::generator::EventGenerator;

/// Errors returned when a match cannot be simulated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// The match already finished.
    #[error("match {0} is already completed")]
    AlreadyCompleted(MatchId),

    /// The match is being simulated elsewhere.
    #[error("match {0} is already live")]
    AlreadyLive(MatchId),

    /// The fixture was postponed and cannot kick off.
    #[error("match {0} is postponed")]
    Postponed(MatchId),

    /// The match ended early and cannot be restarted.
    #[error("match {0} was abandoned")]
    Abandoned(MatchId),

    /// This clock already ran a match.
    #[error("simulation clock has already been used")]
    ClockReused,

    /// A status change was rejected.
    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
}

impl SimulationError {
    /// Error describing why a match in `status` cannot start.
    pub fn not_startable(match_id: &MatchId, status: MatchStatus) -> Option<Self> {
        let id = match_id.clone();
        match status {
            MatchStatus::Scheduled => None,
            MatchStatus::Live => Some(Self::AlreadyLive(id)),
            MatchStatus::Completed => Some(Self::AlreadyCompleted(id)),
            MatchStatus::Postponed => Some(Self::Postponed(id)),
            MatchStatus::Abandoned => Some(Self::Abandoned(id)),
        }
    }
}

/// Failure reported by a [`MinuteCallback`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The receiving side of the update channel is gone.
    #[error("update channel closed at minute {minute}")]
    Closed {
        /// Minute whose update was dropped.
        minute: u8,
    },

    /// Any other delivery failure.
    #[error("minute callback failed: {0}")]
    Failed(String),
}

/// Receives one update per simulated minute in paced mode.
#[async_trait]
pub trait MinuteCallback: Send + Sync {
    /// Handle the update for the minute that was just simulated.
    async fn on_minute(&self, update: MinuteUpdate) -> Result<(), CallbackError>;
}

/// Callback that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

#[async_trait]
impl MinuteCallback for NoOpCallback {
    async fn on_minute(&self, _update: MinuteUpdate) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Callback that enqueues updates onto a bounded channel.
///
/// The receiver is consumed by an independent task (broadcast and
/// persistence), so the clock only ever waits for queue capacity.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<MinuteUpdate>,
}

impl ChannelSink {
    /// Create a sink and its receiver with room for `capacity` updates.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MinuteUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MinuteCallback for ChannelSink {
    async fn on_minute(&self, update: MinuteUpdate) -> Result<(), CallbackError> {
        self.tx
            .send(update)
            .await
            .map_err(|dropped| CallbackError::Closed { minute: dropped.0.minute })
    }
}

/// Shared cancellation handle for one paced match.
#[derive(Debug, Default)]
pub struct MatchControl {
    cancel_requested: AtomicBool,
    notify: Notify,
}

impl MatchControl {
    /// A handle with no cancellation requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the match to stop at the next minute boundary.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Lifecycle of a [`SimulationClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    /// Not started.
    Idle,
    /// Simulating minutes.
    Running,
    /// Ran to full time.
    Completed,
    /// Stopped early by a [`MatchControl`].
    Cancelled,
}

/// Drives one match through regulation time.
#[derive(Debug)]
pub struct SimulationClock {
    generator: EventGenerator,
    minute_interval: Duration,
    phase: ClockPhase,
}

impl SimulationClock {
    /// Create a clock pacing paced runs by `minute_interval`.
    pub const fn new(generator: EventGenerator, minute_interval: Duration) -> Self {
        Self {
            generator,
            minute_interval,
            phase: ClockPhase::Idle,
        }
    }

    /// Current lifecycle phase.
    pub const fn phase(&self) -> ClockPhase {
        self.phase
    }

    /// Simulate all of regulation time without pausing.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if the match is not `scheduled` or this
    /// clock has already been used.
    pub fn simulate(&mut self, state: &mut MatchState) -> Result<MatchResult, SimulationError> {
        self.kick_off(state)?;

        for minute in 1..=REGULATION_MINUTES {
            let outcome = self.generator.generate(state, minute);
            self.generator.apply_effect(state, outcome);
        }

        self.full_time(state)
    }

    /// Simulate regulation time at wall-clock pace.
    ///
    /// Callback errors are logged and the match carries on. If `control`
    /// is cancelled the match stops at the next minute boundary and ends
    /// `abandoned` with statistics as of the last simulated minute.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if the match is not `scheduled` or this
    /// clock has already been used.
    pub async fn simulate_realtime(
        &mut self,
        state: &mut MatchState,
        callback: &dyn MinuteCallback,
        control: &MatchControl,
    ) -> Result<MatchResult, SimulationError> {
        self.kick_off(state)?;

        for minute in 1..=REGULATION_MINUTES {
            if control.is_cancelled() {
                return self.abandon(state);
            }

            let events_before = state.events.len();
            let outcome = self.generator.generate(state, minute);
            self.generator.apply_effect(state, outcome);

            if minute == REGULATION_MINUTES {
                state.set_status(MatchStatus::Completed)?;
            }

            let update = minute_update(state, minute, events_before);
            if let Err(e) = callback.on_minute(update).await {
                warn!(match_id = %state.id, minute, error = %e, "Minute callback failed, continuing");
            }

            if minute < REGULATION_MINUTES {
                tokio::select! {
                    () = tokio::time::sleep(self.minute_interval) => {}
                    () = control.cancelled() => {
                        debug!(match_id = %state.id, minute, "Cancellation interrupted minute pause");
                    }
                }
            }
        }

        self.phase = ClockPhase::Completed;
        info!(
            match_id = %state.id,
            home = state.home_team.score,
            away = state.away_team.score,
            "Full time"
        );
        Ok(state.result())
    }

    fn kick_off(&mut self, state: &mut MatchState) -> Result<(), SimulationError> {
        if self.phase != ClockPhase::Idle {
            return Err(SimulationError::ClockReused);
        }
        if let Some(err) = SimulationError::not_startable(&state.id, state.status) {
            return Err(err);
        }
        state.set_status(MatchStatus::Live)?;
        self.phase = ClockPhase::Running;
        info!(
            match_id = %state.id,
            home = %state.home_team.club_id,
            away = %state.away_team.club_id,
            "Kick-off"
        );
        Ok(())
    }

    fn full_time(&mut self, state: &mut MatchState) -> Result<MatchResult, SimulationError> {
        state.set_status(MatchStatus::Completed)?;
        self.phase = ClockPhase::Completed;
        info!(
            match_id = %state.id,
            home = state.home_team.score,
            away = state.away_team.score,
            "Full time"
        );
        Ok(state.result())
    }

    fn abandon(&mut self, state: &mut MatchState) -> Result<MatchResult, SimulationError> {
        state.set_status(MatchStatus::Abandoned)?;
        self.phase = ClockPhase::Cancelled;
        info!(match_id = %state.id, minute = state.progress.minute, "Match abandoned");
        Ok(state.result())
    }
}

fn minute_update(state: &MatchState, minute: u8, events_before: usize) -> MinuteUpdate {
    MinuteUpdate {
        match_id: state.id.clone(),
        minute,
        score: HomeAway::new(state.home_team.score, state.away_team.score),
        events: state.events.get(events_before..).map(<[_]>::to_vec).unwrap_or_default(),
        statistics: state.statistics.clone(),
        status: state.status,
        possession_totals: state.progress.possession_totals,
    }
}
