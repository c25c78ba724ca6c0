//! Sessions, rooms, and named-event dispatch for one process.
//!
//! A [`BroadcastHub`] owns every socket session attached to this process
//! and the rooms they have joined. Both registries are sharded
//! [`DashMap`]s; a guard on one map is always dropped before the other
//! map is touched, so the two never deadlock.
//!
//! Room broadcasts are delivered to local members first and then handed
//! to an optional [`RoomPublisher`], which mirrors them to sibling
//! processes. Messages arriving from siblings enter through
//! [`BroadcastHub::deliver_local`] and are never mirrored again.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use matchday_resilience::{RateLimiter, ResilienceRegistry};
use matchday_types::{LeagueId, MatchId, RoomKey, SessionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::message::{
    ClientFrame, LeagueMembership, LeagueUpdatePayload, MatchEventPayload, MatchMembership,
    MatchUpdatePayload, MessageKind, ServerMessage, decode_payload, require, require_value,
};

/// A room broadcast as it travels between hubs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    /// Node id of the hub that accepted the broadcast.
    pub origin: String,
    /// Target room.
    pub room: RoomKey,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

impl RoomMessage {
    /// The frame delivered to room members.
    pub fn to_frame(&self) -> ServerMessage {
        ServerMessage::new(self.event.clone(), self.data.clone())
    }
}

/// Receives every broadcast accepted by a hub, for mirroring elsewhere.
///
/// Called synchronously on the broadcasting task; implementations must
/// not block.
pub trait RoomPublisher: Send + Sync {
    /// Mirror `message` to sibling hubs.
    fn publish(&self, message: RoomMessage);
}

#[derive(Debug)]
struct Session {
    principal: UserId,
    rooms: HashSet<RoomKey>,
    tx: mpsc::Sender<ServerMessage>,
    connected_at: DateTime<Utc>,
}

/// Per-process registry of socket sessions and rooms.
pub struct BroadcastHub {
    node_id: String,
    config: HubConfig,
    sessions: DashMap<SessionId, Session>,
    rooms: DashMap<RoomKey, HashSet<SessionId>>,
    connection_limiter: Arc<RateLimiter>,
    message_limiter: Arc<RateLimiter>,
    publisher: RwLock<Option<Arc<dyn RoomPublisher>>>,
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("node_id", &self.node_id)
            .field("sessions", &self.sessions.len())
            .field("rooms", &self.rooms.len())
            .finish_non_exhaustive()
    }
}

impl BroadcastHub {
    /// Create a hub whose limiters come from `registry`.
    pub fn new(node_id: impl Into<String>, config: HubConfig, registry: &ResilienceRegistry) -> Self {
        let connection_limiter = registry.limiter("hub:connect", &config.connection_limit);
        let message_limiter = registry.limiter("hub:message", &config.message_limit);
        Self {
            node_id: node_id.into(),
            config,
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            connection_limiter,
            message_limiter,
            publisher: RwLock::new(None),
        }
    }

    /// Identifier of this hub in the cluster.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The hub's settings.
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Install or remove the cross-process publisher.
    pub fn set_publisher(&self, publisher: Option<Arc<dyn RoomPublisher>>) {
        *self.publisher.write().unwrap_or_else(PoisonError::into_inner) = publisher;
    }

    fn publisher(&self) -> Option<Arc<dyn RoomPublisher>> {
        self.publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Count one connection attempt from `remote_addr`.
    pub fn admit_connection(&self, remote_addr: &str) -> Result<(), HubError> {
        self.connection_limiter.check(remote_addr)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Register an authenticated session.
    ///
    /// The session joins its principal's user room immediately. Frames
    /// for the session arrive on the returned receiver.
    pub fn connect(&self, principal: UserId) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(self.config.session_buffer.max(1));
        let session_id = SessionId::new();
        let user_room = RoomKey::for_user(&principal);

        self.sessions.insert(
            session_id,
            Session {
                principal: principal.clone(),
                rooms: HashSet::from([user_room.clone()]),
                tx,
                connected_at: Utc::now(),
            },
        );
        self.rooms.entry(user_room).or_default().insert(session_id);

        info!(session = %session_id, user = %principal, node = %self.node_id, "Session connected");
        (session_id, rx)
    }

    /// Drop a session and remove it from every room.
    ///
    /// Returns `false` if the session was unknown.
    pub fn disconnect(&self, session_id: SessionId) -> bool {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return false;
        };
        for room in &session.rooms {
            self.remove_member(room, session_id);
        }
        let connected_for = Utc::now().signed_duration_since(session.connected_at);
        info!(
            session = %session_id,
            user = %session.principal,
            rooms = session.rooms.len(),
            connected_secs = connected_for.num_seconds(),
            "Session disconnected"
        );
        true
    }

    /// Add a session to a room.
    pub fn join(&self, session_id: SessionId, room: &RoomKey) -> Result<(), HubError> {
        {
            let mut session = self
                .sessions
                .get_mut(&session_id)
                .ok_or(HubError::SessionNotFound(session_id))?;
            session.rooms.insert(room.clone());
        }
        self.rooms.entry(room.clone()).or_default().insert(session_id);
        debug!(session = %session_id, %room, "Joined room");
        Ok(())
    }

    /// Remove a session from a room.
    pub fn leave(&self, session_id: SessionId, room: &RoomKey) -> Result<(), HubError> {
        {
            let mut session = self
                .sessions
                .get_mut(&session_id)
                .ok_or(HubError::SessionNotFound(session_id))?;
            session.rooms.remove(room);
        }
        self.remove_member(room, session_id);
        debug!(session = %session_id, %room, "Left room");
        Ok(())
    }

    fn remove_member(&self, room: &RoomKey, session_id: SessionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&session_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    // -----------------------------------------------------------------------
    // Inbound messages
    // -----------------------------------------------------------------------

    /// Handle a raw text frame, answering failures with an `error` event.
    pub fn handle_text(&self, session_id: SessionId, text: &str) {
        let result = ClientFrame::parse(text).and_then(|frame| self.handle_message(session_id, frame));
        if let Err(e) = result {
            debug!(session = %session_id, code = e.code(), error = %e, "Rejected client message");
            self.send_to_session(session_id, e.to_frame());
        }
    }

    /// Admit and dispatch one client frame.
    pub fn handle_message(&self, session_id: SessionId, frame: ClientFrame) -> Result<(), HubError> {
        let kind =
            MessageKind::from_name(&frame.event).ok_or_else(|| HubError::UnknownEvent(frame.event.clone()))?;

        if !self.sessions.contains_key(&session_id) {
            return Err(HubError::SessionNotFound(session_id));
        }
        self.message_limiter
            .check(&format!("{session_id}:{}", kind.as_str()))?;

        match kind {
            MessageKind::JoinMatch => {
                let payload: MatchMembership = decode_payload(frame.data)?;
                let (match_id, user) = payload.validate()?;
                self.join(session_id, &RoomKey::for_match(&match_id))?;
                debug!(session = %session_id, match_id = %match_id, user = %user, "Following match");
                self.send_to_session(
                    session_id,
                    ServerMessage::new("joined:match", json!({ "matchId": match_id, "socketId": session_id })),
                );
            }
            MessageKind::LeaveMatch => {
                let payload: MatchMembership = decode_payload(frame.data)?;
                let (match_id, _) = payload.validate()?;
                self.leave(session_id, &RoomKey::for_match(&match_id))?;
                self.send_to_session(session_id, ServerMessage::new("left:match", json!({ "matchId": match_id })));
            }
            MessageKind::JoinLeague => {
                let payload: LeagueMembership = decode_payload(frame.data)?;
                let (league_id, _) = payload.validate()?;
                self.join(session_id, &RoomKey::for_league(&league_id))?;
                self.send_to_session(
                    session_id,
                    ServerMessage::new("joined:league", json!({ "leagueId": league_id, "socketId": session_id })),
                );
            }
            MessageKind::LeaveLeague => {
                let payload: LeagueMembership = decode_payload(frame.data)?;
                let (league_id, _) = payload.validate()?;
                self.leave(session_id, &RoomKey::for_league(&league_id))?;
                self.send_to_session(session_id, ServerMessage::new("left:league", json!({ "leagueId": league_id })));
            }
            MessageKind::MatchEvent => {
                let payload: MatchEventPayload = decode_payload(frame.data)?;
                let match_id = MatchId::new(require("matchId", payload.match_id)?);
                let event = require("event", payload.event)?;
                self.broadcast_to_room(
                    &RoomKey::for_match(&match_id),
                    kind.as_str(),
                    json!({ "event": event, "payload": payload.payload, "timestamp": Utc::now() }),
                );
            }
            MessageKind::MatchUpdate => {
                let payload: MatchUpdatePayload = decode_payload(frame.data)?;
                let match_id = MatchId::new(require("matchId", payload.match_id)?);
                let state = require_value("state", payload.state)?;
                self.broadcast_to_room(
                    &RoomKey::for_match(&match_id),
                    kind.as_str(),
                    json!({ "matchId": match_id, "state": state, "timestamp": Utc::now() }),
                );
            }
            MessageKind::LeagueUpdate => {
                let payload: LeagueUpdatePayload = decode_payload(frame.data)?;
                let league_id = LeagueId::new(require("leagueId", payload.league_id)?);
                let update = require_value("update", payload.update)?;
                self.broadcast_to_room(
                    &RoomKey::for_league(&league_id),
                    kind.as_str(),
                    json!({ "leagueId": league_id, "update": update, "timestamp": Utc::now() }),
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound delivery
    // -----------------------------------------------------------------------

    /// Send `event` to every member of `room`, here and on sibling hubs.
    ///
    /// Returns the number of local sessions the frame was queued for.
    pub fn broadcast_to_room(&self, room: &RoomKey, event: &str, data: Value) -> usize {
        let message = RoomMessage {
            origin: self.node_id.clone(),
            room: room.clone(),
            event: event.to_owned(),
            data,
        };
        let delivered = self.deliver_local(&message);
        if let Some(publisher) = self.publisher() {
            publisher.publish(message);
        }
        delivered
    }

    /// Send `event` to every session of `user_id`, on any hub.
    pub fn send_to_user(&self, user_id: &UserId, event: &str, data: Value) -> usize {
        self.broadcast_to_room(&RoomKey::for_user(user_id), event, data)
    }

    /// Deliver a message to local room members only.
    pub fn deliver_local(&self, message: &RoomMessage) -> usize {
        let members: Vec<SessionId> = self
            .rooms
            .get(&message.room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();

        let frame = message.to_frame();
        members
            .into_iter()
            .filter(|id| self.send_to_session(*id, frame.clone()))
            .count()
    }

    /// Queue a frame for one session. Returns whether it was queued.
    pub fn send_to_session(&self, session_id: SessionId, frame: ServerMessage) -> bool {
        let Some(session) = self.sessions.get(&session_id) else {
            return false;
        };
        match session.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                warn!(session = %session_id, event = %frame.event, "Session queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of local members of `room`.
    pub fn room_size(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map_or(0, |m| m.len())
    }

    /// Rooms a session has joined, sorted.
    pub fn session_rooms(&self, session_id: SessionId) -> Vec<RoomKey> {
        let mut rooms: Vec<RoomKey> = self
            .sessions
            .get(&session_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// The principal a session authenticated as.
    pub fn principal(&self, session_id: SessionId) -> Option<UserId> {
        self.sessions.get(&session_id).map(|s| s.principal.clone())
    }
}
