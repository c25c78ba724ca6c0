//! Enumeration types for matches and match events.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Match status
// ---------------------------------------------------------------------------

/// Lifecycle status of a match.
///
/// Transitions are monotonic: `Scheduled -> Live -> Completed`.
/// `Postponed` is reachable only from `Scheduled`, and `Abandoned` only
/// from `Live` (a cancelled simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum MatchStatus {
    /// Fixture exists, kick-off has not happened.
    Scheduled,
    /// The simulation clock is running.
    Live,
    /// Full time. The record is immutable from here on.
    Completed,
    /// Moved to a later date before kick-off.
    Postponed,
    /// Stopped mid-game; statistics reflect the last simulated minute.
    Abandoned,
}

/// An illegal status transition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal match status transition from {from:?} to {to:?}")]
pub struct StatusTransitionError {
    /// Status before the attempted transition.
    pub from: MatchStatus,
    /// Status that was requested.
    pub to: MatchStatus,
}

impl MatchStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Live | Self::Postponed)
                | (Self::Live, Self::Completed | Self::Abandoned)
        )
    }

    /// Validate a transition, returning the new status on success.
    pub const fn transition_to(self, next: Self) -> Result<Self, StatusTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusTransitionError {
                from: self,
                to: next,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Kind of an in-match event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A shot that beat the goalkeeper.
    Goal,
    /// An attempt on goal that did not score.
    Shot,
    /// A foul committed by the acting side.
    Foul,
    /// A corner kick awarded to the acting side.
    Corner,
    /// A booking following a foul.
    Card,
    /// A substitution. Not produced by the generator; reserved for
    /// externally recorded events.
    Substitution,
    /// An injury stoppage. Not produced by the generator.
    Injury,
}

/// Which team acted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Side {
    /// The home team.
    Home,
    /// The away team.
    Away,
}
