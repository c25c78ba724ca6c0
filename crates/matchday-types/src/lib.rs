//! Shared type definitions for the Matchday simulation.
//!
//! This crate is the single source of truth for the match record, its
//! events, and the room keys used by the broadcast layer. Wire types flow
//! downstream to `TypeScript` via `ts-rs` for the client application.
//!
//! # Modules
//!
//! - [`ids`] -- Opaque external keys and locally minted session ids
//! - [`enums`] -- Match status lifecycle, event kinds, sides
//! - [`structs`] -- Match record, statistics, minute updates, results
//! - [`rooms`] -- Room keys (`match:<id>`, `league:<id>`, `user:<id>`)

pub mod enums;
pub mod ids;
pub mod rooms;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EventKind, MatchStatus, Side, StatusTransitionError};
pub use ids::{ClubId, LeagueId, MatchId, PlayerId, SessionId, UserId};
pub use rooms::{RoomKey, RoomKeyError};
pub use structs::{
    HomeAway, MatchEvent, MatchProgress, MatchResult, MatchState, MatchStatistics, MinuteUpdate,
    REGULATION_MINUTES, Tactics, TeamSheet,
};
