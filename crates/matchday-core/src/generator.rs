//! Per-minute event generation.
//!
//! Each minute the generator resamples both teams' strength inside a fixed
//! band (never cached across minutes, which keeps possession noisy rather
//! than streaky), decides whether an event fires, picks its kind and
//! acting side, and reports the minute's possession split. Applying the
//! outcome to a [`MatchState`] is a separate step so callers can inspect
//! or broadcast the outcome first.
//!
//! # Randomness
//!
//! All randomness comes from a [`MatchRng`]. Every draw is labelled with a
//! [`Draw`] so tests can force individual decisions (for example, never
//! converting a shot) while leaving the rest random.

use matchday_types::{EventKind, HomeAway, MatchEvent, MatchState, Side, Tactics};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;

/// Event kinds that can fire in open play, chosen uniformly.
const OPEN_PLAY_KINDS: [EventKind; 3] = [EventKind::Shot, EventKind::Foul, EventKind::Corner];

/// Purpose of a random draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    /// Position of a team inside the strength band.
    Strength(Side),
    /// Whether an event fires this minute.
    EventFires,
    /// Which side acts.
    ActingSide,
    /// Which open-play kind fires.
    EventKind,
    /// Whether a shot is converted.
    GoalConversion,
    /// Whether a foul draws a card.
    Booking,
}

/// Source of uniform draws in `[0.0, 1.0)`.
pub trait MatchRng: Send {
    /// Produce the next draw for `draw`.
    fn draw(&mut self, draw: Draw) -> f64;
}

/// Standard RNG ignoring draw labels.
#[derive(Debug, Clone)]
pub struct SeededRng(StdRng);

impl SeededRng {
    /// Deterministic generator for a given seed.
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Generator seeded from the operating system.
    pub fn from_os() -> Self {
        Self(StdRng::from_os_rng())
    }
}

impl MatchRng for SeededRng {
    fn draw(&mut self, _draw: Draw) -> f64 {
        self.0.random::<f64>()
    }
}

/// Everything one simulated minute produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteOutcome {
    /// The minute, 1..=90.
    pub minute: u8,
    /// Resampled strength of both teams.
    pub strength: HomeAway<f64>,
    /// Events in the order they happened (empty, one, or foul + card).
    pub events: Vec<MatchEvent>,
}

impl MinuteOutcome {
    /// Home share of possession for this minute, in `0.0..=1.0`.
    pub fn home_possession(&self) -> f64 {
        let total = self.strength.home + self.strength.away;
        if total > 0.0 {
            self.strength.home / total
        } else {
            0.5
        }
    }
}

/// Strength of a team for one minute.
///
/// A pure function of the team's tactics, the minute, and one uniform
/// `roll`. The roll places the team inside the configured band; attacking
/// intent tilts the result by up to ten percent, and attack-minded teams
/// push a little harder in the last fifteen minutes.
pub fn sample_strength(tactics: &Tactics, minute: u8, roll: f64, config: &SimulationConfig) -> f64 {
    let span = config.strength_ceiling - config.strength_floor;
    let base = roll.clamp(0.0, 1.0).mul_add(span, config.strength_floor);

    let intent = (f64::from(tactics.attacking.min(100)) - 50.0) / 500.0;
    let late_push = if minute > 75 { intent / 2.0 } else { 0.0 };

    base * (1.0 + intent + late_push)
}

/// Decides and applies per-minute events.
pub struct EventGenerator {
    config: SimulationConfig,
    rng: Box<dyn MatchRng>,
}

impl std::fmt::Debug for EventGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventGenerator {
    /// Create a generator drawing from `rng`.
    pub fn new(config: SimulationConfig, rng: Box<dyn MatchRng>) -> Self {
        Self { config, rng }
    }

    /// Create a generator seeded from `config.seed`, or from the OS.
    pub fn from_config(config: SimulationConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(SeededRng::from_os, SeededRng::new);
        Self::new(config, Box::new(rng))
    }

    /// The generator's settings.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Decide what happens in `minute`. Does not touch `state`.
    pub fn generate(&mut self, state: &MatchState, minute: u8) -> MinuteOutcome {
        let strength = HomeAway::new(
            sample_strength(
                &state.home_team.tactics,
                minute,
                self.rng.draw(Draw::Strength(Side::Home)),
                &self.config,
            ),
            sample_strength(
                &state.away_team.tactics,
                minute,
                self.rng.draw(Draw::Strength(Side::Away)),
                &self.config,
            ),
        );

        let mut outcome = MinuteOutcome {
            minute,
            strength,
            events: Vec::new(),
        };

        if self.rng.draw(Draw::EventFires) >= self.config.event_probability {
            return outcome;
        }

        let side = if self.rng.draw(Draw::ActingSide) < outcome.home_possession() {
            Side::Home
        } else {
            Side::Away
        };
        let team = &state.team(side).club_id;

        let kind = pick_open_play_kind(self.rng.draw(Draw::EventKind));
        let event = |kind: EventKind, description: Option<String>| MatchEvent {
            minute,
            kind,
            side,
            team_id: team.clone(),
            description,
        };

        match kind {
            EventKind::Shot if self.rng.draw(Draw::GoalConversion) < self.config.goal_probability => {
                outcome.events.push(event(
                    EventKind::Goal,
                    Some(format!("GOAL! {team} score in minute {minute}")),
                ));
            }
            EventKind::Foul => {
                outcome.events.push(event(EventKind::Foul, None));
                if self.rng.draw(Draw::Booking) < self.config.card_probability {
                    outcome.events.push(event(
                        EventKind::Card,
                        Some(format!("Yellow card for {team} in minute {minute}")),
                    ));
                }
            }
            other => outcome.events.push(event(other, None)),
        }

        outcome
    }

    /// Apply `outcome` to `state`: events, score, and statistics.
    pub fn apply_effect(&self, state: &mut MatchState, outcome: MinuteOutcome) {
        let home_share = outcome.home_possession();
        let progress = &mut state.progress;
        progress.minute = outcome.minute;
        progress.possession_totals.home += home_share;
        progress.possession_totals.away += 1.0 - home_share;

        let minutes = f64::from(outcome.minute.max(1));
        let stats = &mut state.statistics;
        stats.possession.home = round_tenth(progress.possession_totals.home / minutes * 100.0);
        stats.possession.away = round_tenth(progress.possession_totals.away / minutes * 100.0);

        let passes = f64::from(self.config.passes_per_minute);
        stats.passes.home = stats.passes.home.saturating_add(round_count(home_share * passes));
        stats.passes.away = stats.passes.away.saturating_add(round_count((1.0 - home_share) * passes));

        // Both shot counters move whenever anything fires, whichever side acted.
        if !outcome.events.is_empty() {
            stats.shots.home = stats.shots.home.saturating_add(1);
            stats.shots.away = stats.shots.away.saturating_add(1);
        }

        for event in outcome.events {
            let side = event.side;
            match event.kind {
                EventKind::Goal => {
                    let team = state.team_mut(side);
                    team.score = team.score.saturating_add(1);
                    bump(state.statistics.shots_on_target.get_mut(side));
                }
                EventKind::Foul => bump(state.statistics.fouls.get_mut(side)),
                EventKind::Corner => bump(state.statistics.corners.get_mut(side)),
                EventKind::Card => bump(state.statistics.cards.get_mut(side)),
                EventKind::Shot | EventKind::Substitution | EventKind::Injury => {}
            }
            state.events.push(event);
        }
    }
}

fn pick_open_play_kind(roll: f64) -> EventKind {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (roll.clamp(0.0, 1.0) * 3.0) as usize;
    OPEN_PLAY_KINDS
        .get(index)
        .or_else(|| OPEN_PLAY_KINDS.last())
        .copied()
        .unwrap_or(EventKind::Shot)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_count(value: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = value.round().clamp(0.0, f64::from(u32::MAX)) as u32;
    count
}

fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}
