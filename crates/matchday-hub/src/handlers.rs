//! Administrative HTTP handlers.
//!
//! These let other backend services push events into rooms without
//! holding a socket. Validation failures answer `400` with the standard
//! error body.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use matchday_types::RoomKey;
use serde_json::{Value, json};
use tracing::info;

use crate::error::HubError;
use crate::message::{BroadcastRequest, SendRequest, require};
use crate::state::AppState;

/// Liveness and a summary of local hub occupancy.
///
/// # Route
///
/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "nodeId": state.hub.node_id(),
        "sessions": state.hub.session_count(),
        "rooms": state.hub.room_count(),
    }))
}

/// Broadcast an event to a room across the cluster.
///
/// # Route
///
/// `POST /broadcast` with `{room, event, data}`
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<Value>, HubError> {
    let Json(request) = body.map_err(|e| HubError::InvalidFrame(e.body_text()))?;
    let room: RoomKey = require("room", request.room)?.parse()?;
    let event = require("event", request.event)?;

    let delivered = state.hub.broadcast_to_room(&room, &event, request.data);
    info!(%room, %event, delivered, "Admin broadcast");

    Ok(Json(json!({
        "success": true,
        "room": room,
        "event": event,
        "delivered": delivered,
    })))
}

/// Send an event to every session of one user across the cluster.
///
/// # Route
///
/// `POST /send` with `{userId, event, data}`
pub async fn send(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<Value>, HubError> {
    let Json(request) = body.map_err(|e| HubError::InvalidFrame(e.body_text()))?;
    let user = request.user()?;
    let event = require("event", request.event)?;

    let delivered = state.hub.send_to_user(&user, &event, request.data);
    info!(user = %user, %event, delivered, "Admin send");

    Ok(Json(json!({
        "success": true,
        "userId": user,
        "event": event,
        "delivered": delivered,
    })))
}
