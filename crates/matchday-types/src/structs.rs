//! Match records and the payloads derived from them.
//!
//! The JSON shape of [`MatchState`] is the match resource returned by the
//! owning service: camelCase keys, per-counter `{home, away}` statistics,
//! and events carrying a `type` tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EventKind, MatchStatus, Side, StatusTransitionError};
use crate::ids::{ClubId, LeagueId, MatchId, PlayerId};

/// Number of regulation minutes in a match.
pub const REGULATION_MINUTES: u8 = 90;

// ---------------------------------------------------------------------------
// Per-side pairs
// ---------------------------------------------------------------------------

/// A value kept for both teams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HomeAway<T> {
    /// Value for the home team.
    pub home: T,
    /// Value for the away team.
    pub away: T,
}

impl<T> HomeAway<T> {
    /// Build a pair from both values.
    pub const fn new(home: T, away: T) -> Self {
        Self { home, away }
    }

    /// Borrow the value for `side`.
    pub const fn get(&self, side: Side) -> &T {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    /// Mutably borrow the value for `side`.
    pub const fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Home => &mut self.home,
            Side::Away => &mut self.away,
        }
    }
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

/// Tactical setup chosen for a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Tactics {
    /// Formation tag, e.g. `4-4-2`.
    pub formation: String,
    /// Attacking intent, 0..=100.
    pub attacking: u8,
    /// Defensive intent, 0..=100.
    pub defending: u8,
    /// Play-style tag, e.g. `possession` or `counter`.
    pub play_style: String,
}

impl Default for Tactics {
    fn default() -> Self {
        Self {
            formation: String::from("4-4-2"),
            attacking: 50,
            defending: 50,
            play_style: String::from("balanced"),
        }
    }
}

/// One team's side of a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TeamSheet {
    /// The club fielding this team.
    pub club_id: ClubId,
    /// Goals scored so far.
    #[serde(default)]
    pub score: u32,
    /// Ordered starting lineup.
    #[serde(default)]
    pub lineup: Vec<PlayerId>,
    /// Tactical setup.
    #[serde(default)]
    pub tactics: Tactics,
}

impl TeamSheet {
    /// A team sheet with default tactics and an empty lineup.
    pub fn new(club_id: ClubId) -> Self {
        Self {
            club_id,
            score: 0,
            lineup: Vec::new(),
            tactics: Tactics::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events and statistics
// ---------------------------------------------------------------------------

/// A single in-match event. Immutable once appended to a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MatchEvent {
    /// Match minute, 1..=90.
    pub minute: u8,
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Which team acted.
    pub side: Side,
    /// Club of the acting team.
    pub team_id: ClubId,
    /// Optional human-readable commentary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Aggregated match statistics.
///
/// `possession` is a percentage; `home + away` is 100 within rounding at
/// every minute boundary once the first minute has been simulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MatchStatistics {
    /// Possession percentage per side.
    pub possession: HomeAway<f64>,
    /// Shots per side.
    pub shots: HomeAway<u32>,
    /// Shots on target per side.
    pub shots_on_target: HomeAway<u32>,
    /// Corners per side.
    pub corners: HomeAway<u32>,
    /// Fouls per side.
    pub fouls: HomeAway<u32>,
    /// Completed passes per side.
    pub passes: HomeAway<u32>,
    /// Bookings per side.
    #[serde(default)]
    pub cards: HomeAway<u32>,
}

/// Running totals the clock keeps so possession can be re-derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MatchProgress {
    /// Last fully simulated minute (0 before kick-off).
    pub minute: u8,
    /// Sum of per-minute possession ratios, each in `0.0..=1.0`.
    pub possession_totals: HomeAway<f64>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// The mutable record of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MatchState {
    /// Match identifier.
    pub id: MatchId,
    /// Home team.
    pub home_team: TeamSheet,
    /// Away team.
    pub away_team: TeamSheet,
    /// Scheduled kick-off.
    pub date: DateTime<Utc>,
    /// League the fixture belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_id: Option<LeagueId>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Append-only event log, minute non-decreasing.
    #[serde(default)]
    pub events: Vec<MatchEvent>,
    /// Aggregated statistics.
    #[serde(default)]
    pub statistics: MatchStatistics,
    /// Simulation progress.
    #[serde(default)]
    pub progress: MatchProgress,
}

impl MatchState {
    /// A freshly scheduled fixture with empty statistics.
    pub fn scheduled(id: MatchId, home: TeamSheet, away: TeamSheet, date: DateTime<Utc>) -> Self {
        Self {
            id,
            home_team: home,
            away_team: away,
            date,
            league_id: None,
            status: MatchStatus::Scheduled,
            events: Vec::new(),
            statistics: MatchStatistics::default(),
            progress: MatchProgress::default(),
        }
    }

    /// Borrow the team sheet for `side`.
    pub const fn team(&self, side: Side) -> &TeamSheet {
        match side {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }

    /// Mutably borrow the team sheet for `side`.
    pub const fn team_mut(&mut self, side: Side) -> &mut TeamSheet {
        match side {
            Side::Home => &mut self.home_team,
            Side::Away => &mut self.away_team,
        }
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn set_status(&mut self, next: MatchStatus) -> Result<(), StatusTransitionError> {
        self.status = self.status.transition_to(next)?;
        Ok(())
    }

    /// Number of goal events recorded for `side`.
    pub fn goals_for(&self, side: Side) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Goal && e.side == side)
            .count()
    }

    /// Summarize the match for downstream consumers (standings).
    pub fn result(&self) -> MatchResult {
        MatchResult {
            match_id: self.id.clone(),
            league_id: self.league_id.clone(),
            home_club: self.home_team.club_id.clone(),
            away_club: self.away_team.club_id.clone(),
            home_score: self.home_team.score,
            away_score: self.away_team.score,
            status: self.status,
        }
    }
}

/// Final result reported to the standings service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MatchResult {
    /// Match identifier.
    pub match_id: MatchId,
    /// League the fixture belongs to, if any.
    pub league_id: Option<LeagueId>,
    /// Home club.
    pub home_club: ClubId,
    /// Away club.
    pub away_club: ClubId,
    /// Home goals.
    pub home_score: u32,
    /// Away goals.
    pub away_score: u32,
    /// Final status (`completed` or `abandoned`).
    pub status: MatchStatus,
}

/// Snapshot published after every simulated minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MinuteUpdate {
    /// Match identifier.
    pub match_id: MatchId,
    /// The minute that was just simulated.
    pub minute: u8,
    /// Current score.
    pub score: HomeAway<u32>,
    /// Events appended during this minute (possibly empty).
    pub events: Vec<MatchEvent>,
    /// Statistics after this minute.
    pub statistics: MatchStatistics,
    /// Status after this minute.
    pub status: MatchStatus,
    /// Running possession sums after this minute, so a stored snapshot
    /// can keep deriving possession.
    #[serde(default)]
    pub possession_totals: HomeAway<f64>,
}
