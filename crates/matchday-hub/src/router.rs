//! Axum router construction for the hub.
//!
//! Assembles the socket endpoint and the administrative routes into a
//! single [`Router`] with CORS and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the hub router.
///
/// The router includes:
/// - `GET /health` -- liveness and occupancy
/// - `POST /broadcast` -- push an event to a room
/// - `POST /send` -- push an event to a user
/// - `GET /ws` -- authenticated client sessions
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/broadcast", post(handlers::broadcast))
        .route("/send", post(handlers::send))
        .route("/ws", get(ws::ws_connect))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
