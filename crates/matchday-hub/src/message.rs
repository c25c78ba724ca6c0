//! Wire frames and named-event dispatch.
//!
//! Every frame in either direction is a JSON object
//! `{ "event": <name>, "data": <payload> }`. Inbound names resolve to a
//! closed [`MessageKind`] through [`MESSAGE_KINDS`]; anything else is
//! answered with an `error` event.

use matchday_types::{LeagueId, MatchId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

/// Inbound events the hub handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Join a match room.
    JoinMatch,
    /// Leave a match room.
    LeaveMatch,
    /// Relay an arbitrary match event to a match room.
    MatchEvent,
    /// Relay a match state update to a match room.
    MatchUpdate,
    /// Relay a league update to a league room.
    LeagueUpdate,
    /// Join a league room.
    JoinLeague,
    /// Leave a league room.
    LeaveLeague,
}

/// Wire name to kind lookup table.
pub const MESSAGE_KINDS: &[(&str, MessageKind)] = &[
    ("join:match", MessageKind::JoinMatch),
    ("leave:match", MessageKind::LeaveMatch),
    ("match:event", MessageKind::MatchEvent),
    ("match:update", MessageKind::MatchUpdate),
    ("league:update", MessageKind::LeagueUpdate),
    ("join:league", MessageKind::JoinLeague),
    ("leave:league", MessageKind::LeaveLeague),
];

impl MessageKind {
    /// Resolve a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        MESSAGE_KINDS
            .iter()
            .find(|(wire, _)| *wire == name)
            .map(|(_, kind)| *kind)
    }

    /// The wire name.
    pub fn as_str(self) -> &'static str {
        MESSAGE_KINDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map_or("unknown", |(wire, _)| *wire)
    }
}

/// Frame received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl ClientFrame {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, HubError> {
        serde_json::from_str(text).map_err(|e| HubError::InvalidFrame(e.to_string()))
    }
}

/// Frame sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

impl ServerMessage {
    /// Build a frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Payload of `join:match` and `leave:match`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMembership {
    /// Match to join or leave.
    pub match_id: Option<String>,
    /// Client-reported user. Required, but the session's principal still
    /// comes from its token.
    pub user_id: Option<String>,
}

/// Payload of `join:league` and `leave:league`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueMembership {
    /// League to join or leave.
    pub league_id: Option<String>,
    /// Client-reported user, required like the match variant.
    pub user_id: Option<String>,
}

/// Payload of `match:event`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEventPayload {
    /// Target match.
    pub match_id: Option<String>,
    /// Name of the relayed event.
    pub event: Option<String>,
    /// Opaque event body.
    #[serde(default)]
    pub payload: Value,
}

/// Payload of `match:update`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchUpdatePayload {
    /// Target match.
    pub match_id: Option<String>,
    /// Opaque match state.
    pub state: Option<Value>,
}

/// Payload of `league:update`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueUpdatePayload {
    /// Target league.
    pub league_id: Option<String>,
    /// Opaque update body.
    pub update: Option<Value>,
}

/// Decode a payload, treating a missing or null payload as empty.
pub fn decode_payload<T>(data: Value) -> Result<T, HubError>
where
    T: DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| HubError::InvalidFrame(e.to_string()))
}

/// A non-empty string field.
pub fn require(field: &'static str, value: Option<String>) -> Result<String, HubError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(HubError::MissingField { field })
}

/// A present, non-null JSON field.
pub fn require_value(field: &'static str, value: Option<Value>) -> Result<Value, HubError> {
    value
        .filter(|v| !v.is_null())
        .ok_or(HubError::MissingField { field })
}

impl MatchMembership {
    /// The match and user ids, both required. `matchId` is checked first.
    pub fn validate(self) -> Result<(MatchId, UserId), HubError> {
        let match_id = require("matchId", self.match_id).map(MatchId::new)?;
        let user_id = require("userId", self.user_id).map(UserId::new)?;
        Ok((match_id, user_id))
    }
}

impl LeagueMembership {
    /// The league and user ids, both required.
    pub fn validate(self) -> Result<(LeagueId, UserId), HubError> {
        let league_id = require("leagueId", self.league_id).map(LeagueId::new)?;
        let user_id = require("userId", self.user_id).map(UserId::new)?;
        Ok((league_id, user_id))
    }
}

/// Body of `POST /broadcast`.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    /// Room key, e.g. `match:123`.
    pub room: Option<String>,
    /// Event name.
    pub event: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

/// Body of `POST /send`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Target user.
    pub user_id: Option<String>,
    /// Event name.
    pub event: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl SendRequest {
    /// The target user, validated.
    pub fn user(&self) -> Result<UserId, HubError> {
        require("userId", self.user_id.clone()).map(UserId::new)
    }
}
