//! `WebSocket` endpoint for client sessions.
//!
//! Clients connect to `GET /ws`. Before the upgrade the request passes
//! the per-address connection limit and bearer token verification; a
//! failure answers with the JSON error body and no session is created.
//! After the upgrade every text frame is dispatched through the hub and
//! every frame the hub queues for the session is written back.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::{Extensions, HeaderMap};
use axum::response::{IntoResponse, Response};
use matchday_types::UserId;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::extract_token;
use crate::error::HubError;
use crate::state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Bearer token for clients that cannot set headers.
    pub token: Option<String>,
}

/// Admit, authenticate, and upgrade a socket connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_connect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ConnectQuery>,
    extensions: Extensions,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let remote = remote_addr(&headers, &extensions, state.hub.config().trust_forwarded_for);

    let principal = match admit(&state, &remote, &headers, query.token.as_deref()) {
        Ok(principal) => principal,
        Err(e) => {
            debug!(%remote, code = e.code(), error = %e, "Connection rejected");
            return e.into_response();
        }
    };

    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, principal)),
        Err(rejection) => rejection.into_response(),
    }
}

fn admit(
    state: &AppState,
    remote: &str,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<UserId, HubError> {
    state.hub.admit_connection(remote)?;
    let token = extract_token(headers, query_token)?;
    state.verifier.verify(&token)
}

/// Client address used as the connection-limit key.
///
/// The socket peer by default. The first `x-forwarded-for` hop is used
/// only when `trust_forwarded` is set, since clients control the header.
fn remote_addr(headers: &HeaderMap, extensions: &Extensions, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);
    forwarded
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| String::from("unknown"))
}

/// Pump frames between the socket and the hub until either side closes.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, principal: UserId) {
    let hub = Arc::clone(&state.hub);
    let (session_id, mut outbound) = hub.connect(principal);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!(session = %session_id, "Session queue closed");
                    break;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(session = %session_id, "Failed to serialize frame: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(session = %session_id, "WebSocket client disconnected (send failed)");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => hub.handle_text(session_id, text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(session = %session_id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session = %session_id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(session = %session_id, "WebSocket error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for the hub.
                    }
                }
            }
        }
    }

    hub.disconnect(session_id);
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        extensions
    }

    #[test]
    fn socket_peer_is_the_key_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        assert_eq!(remote_addr(&headers, &peer(), false), "127.0.0.1");
        assert_eq!(remote_addr(&HeaderMap::new(), &Extensions::new(), false), "unknown");
    }

    #[test]
    fn forwarded_header_is_honoured_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        assert_eq!(remote_addr(&headers, &peer(), true), "203.0.113.9");
        assert_eq!(remote_addr(&HeaderMap::new(), &peer(), true), "127.0.0.1");
    }
}
