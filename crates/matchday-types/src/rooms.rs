//! Room keys for the broadcast hub.
//!
//! A room is a multicast group identified by a string key on the wire:
//! `match:<id>`, `league:<id>`, or `user:<id>`. Every session joins the
//! user room of its own principal so direct pushes fan out across
//! processes the same way room broadcasts do.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{LeagueId, MatchId, UserId};

/// A parsed room key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoomKey {
    /// Followers of one match.
    Match(MatchId),
    /// Followers of one league.
    League(LeagueId),
    /// Every session of one user.
    User(UserId),
}

/// A room key string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid room key {0:?}: expected match:<id>, league:<id> or user:<id>")]
pub struct RoomKeyError(pub String);

impl RoomKey {
    /// Room for a match.
    pub fn for_match(id: &MatchId) -> Self {
        Self::Match(id.clone())
    }

    /// Room for a league.
    pub fn for_league(id: &LeagueId) -> Self {
        Self::League(id.clone())
    }

    /// Room for a user.
    pub fn for_user(id: &UserId) -> Self {
        Self::User(id.clone())
    }
}

impl core::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Match(id) => write!(f, "match:{id}"),
            Self::League(id) => write!(f, "league:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl FromStr for RoomKey {
    type Err = RoomKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| RoomKeyError(s.to_owned()))?;
        if id.trim().is_empty() {
            return Err(RoomKeyError(s.to_owned()));
        }
        match prefix {
            "match" => Ok(Self::Match(MatchId::new(id))),
            "league" => Ok(Self::League(LeagueId::new(id))),
            "user" => Ok(Self::User(UserId::new(id))),
            _ => Err(RoomKeyError(s.to_owned())),
        }
    }
}

impl Serialize for RoomKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
