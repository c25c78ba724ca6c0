//! Match lifecycle endpoints.
//!
//! - `GET /api/matches/{id}` -- current match record
//! - `POST /api/matches/{id}/start` -- kick off in paced mode (202)
//! - `POST /api/matches/{id}/simulate` -- run to full time now (200)
//! - `POST /api/matches/{id}/cancel` -- stop a live match (202)
//!
//! Lifecycle conflicts answer 409, unknown ids 404, an unavailable store
//! 503.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use matchday_types::MatchId;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::EngineError;
use crate::service::MatchService;

/// Body returned by the start and cancel commands.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    /// Always `true`; failures use the error body.
    pub ok: bool,
    /// The match the command targeted.
    pub match_id: MatchId,
    /// What happened.
    pub message: String,
}

/// Build the match lifecycle router.
pub fn match_router(service: Arc<MatchService>) -> Router {
    Router::new()
        .route("/api/matches/{id}", get(get_match))
        .route("/api/matches/{id}/start", post(start_match))
        .route("/api/matches/{id}/simulate", post(simulate_match))
        .route("/api/matches/{id}/cancel", post(cancel_match))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// ---------------------------------------------------------------------------
// GET /api/matches/{id}
// ---------------------------------------------------------------------------

async fn get_match(
    State(service): State<Arc<MatchService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let state = service.get(&MatchId::new(id)).await?;
    Ok(Json(state))
}

// ---------------------------------------------------------------------------
// POST /api/matches/{id}/start
// ---------------------------------------------------------------------------

async fn start_match(
    State(service): State<Arc<MatchService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let match_id = MatchId::new(id);
    service.start(&match_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            ok: true,
            message: format!("Match {match_id} kicked off"),
            match_id,
        }),
    ))
}

// ---------------------------------------------------------------------------
// POST /api/matches/{id}/simulate
// ---------------------------------------------------------------------------

async fn simulate_match(
    State(service): State<Arc<MatchService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let state = service.simulate_now(&MatchId::new(id)).await?;
    Ok(Json(state))
}

// ---------------------------------------------------------------------------
// POST /api/matches/{id}/cancel
// ---------------------------------------------------------------------------

async fn cancel_match(
    State(service): State<Arc<MatchService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let match_id = MatchId::new(id);
    service.cancel(&match_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            ok: true,
            message: format!("Match {match_id} will stop at the next minute"),
            match_id,
        }),
    ))
}
