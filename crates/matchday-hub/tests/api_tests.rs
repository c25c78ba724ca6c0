//! Integration tests for the hub's HTTP surface.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Socket upgrades cannot complete this way, so
//! the `/ws` tests cover admission only.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use matchday_hub::auth::Claims;
use matchday_hub::{AppState, BroadcastHub, HubConfig, JwtVerifier, ServerMessage, build_router};
use matchday_resilience::{RateLimitConfig, ResilienceConfig, ResilienceRegistry};
use matchday_types::UserId;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

fn make_state(config: HubConfig) -> Arc<AppState> {
    let registry = ResilienceRegistry::new(ResilienceConfig::default());
    let hub = Arc::new(BroadcastHub::new("node-test", config, &registry));
    Arc::new(AppState::new(hub, Arc::new(JwtVerifier::new(SECRET))))
}

fn token(sub: &str) -> String {
    let exp = u64::try_from(chrono::Utc::now().timestamp()).unwrap() + 3_600;
    let claims = Claims {
        sub: sub.to_owned(),
        exp,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn ws_request(uri: &str, peer: [u8; 4], forwarded_for: &str) -> Request<Body> {
    let mut request = Request::builder()
        .uri(uri)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40_000))));
    request
}

fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut frames = Vec::new();
    while let Ok(f) = rx.try_recv() {
        frames.push(f);
    }
    frames
}

#[tokio::test]
async fn health_reports_node_and_occupancy() {
    let state = make_state(HubConfig::default());
    let (_session, _rx) = state.hub.connect(UserId::new("u1"));

    let (status, body) = send(&state, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["nodeId"], "node-test");
    assert_eq!(body["sessions"], 1);
}

#[tokio::test]
async fn broadcast_reaches_room_members() {
    let state = make_state(HubConfig::default());
    let (session, mut rx) = state.hub.connect(UserId::new("u1"));
    state.hub.join(session, &"match:123".parse().unwrap()).unwrap();

    let (status, body) = send(
        &state,
        post_json("/broadcast", &json!({ "room": "match:123", "event": "match:update", "data": { "minute": 3 } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["delivered"], 1);
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "match:update");
    assert_eq!(frames[0].data["minute"], 3);
}

#[tokio::test]
async fn broadcast_rejects_bad_room_and_missing_event() {
    let state = make_state(HubConfig::default());

    let (status, body) = send(&state, post_json("/broadcast", &json!({ "room": "team:1", "event": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = send(&state, post_json("/broadcast", &json!({ "room": "match:1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "event is required");
    assert_eq!(body["details"]["field"], "event");
}

#[tokio::test]
async fn broadcast_rejects_malformed_json() {
    let state = make_state(HubConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/broadcast")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FRAME");
}

#[tokio::test]
async fn send_targets_every_session_of_the_user() {
    let state = make_state(HubConfig::default());
    let (_a, mut rx_a) = state.hub.connect(UserId::new("u1"));
    let (_b, mut rx_b) = state.hub.connect(UserId::new("u1"));
    let (_c, mut rx_c) = state.hub.connect(UserId::new("u2"));

    let (status, body) = send(
        &state,
        post_json("/send", &json!({ "userId": "u1", "event": "notification", "data": { "text": "hello" } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], 2);
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
    assert!(drain(&mut rx_c).is_empty());
}

#[tokio::test]
async fn send_requires_user_id() {
    let state = make_state(HubConfig::default());
    let (status, body) = send(&state, post_json("/send", &json!({ "event": "notification" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "userId is required");
}

#[tokio::test]
async fn socket_without_token_is_rejected_before_any_session() {
    let state = make_state(HubConfig::default());

    let (status, body) = send(&state, ws_request("/ws", [198, 51, 100, 1], "")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().starts_with("Authentication error: "));
    assert_eq!(state.hub.session_count(), 0);
}

#[tokio::test]
async fn socket_with_forged_token_is_rejected() {
    let state = make_state(HubConfig::default());
    let forged = encode(
        &Header::default(),
        &Claims {
            sub: String::from("u1"),
            exp: u64::MAX / 2,
        },
        &EncodingKey::from_secret(b"wrong"),
    )
    .unwrap();

    let (status, body) = send(&state, ws_request(&format!("/ws?token={forged}"), [198, 51, 100, 2], "")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn valid_token_passes_admission() {
    let state = make_state(HubConfig::default());
    let request = Request::builder()
        .uri("/ws")
        .header("authorization", format!("Bearer {}", token("u1")))
        .body(Body::empty())
        .unwrap();

    let (status, _body) = send(&state, request).await;

    // Admission succeeded; the plain HTTP request then fails the upgrade itself.
    assert_ne!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(state.hub.session_count(), 0);
}

#[tokio::test]
async fn connection_attempts_are_limited_per_address() {
    let state = make_state(HubConfig {
        connection_limit: RateLimitConfig::new(1, Duration::from_secs(60)),
        ..HubConfig::default()
    });
    let uri = format!("/ws?token={}", token("u1"));

    let (first, _) = send(&state, ws_request(&uri, [192, 0, 2, 7], "")).await;
    let (second, body) = send(&state, ws_request(&uri, [192, 0, 2, 7], "")).await;
    let (other, _) = send(&state, ws_request(&uri, [192, 0, 2, 8], "")).await;

    assert_ne!(first, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_ne!(other, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn rotating_forwarded_header_shares_the_peer_bucket() {
    let state = make_state(HubConfig {
        connection_limit: RateLimitConfig::new(1, Duration::from_secs(60)),
        ..HubConfig::default()
    });
    let uri = format!("/ws?token={}", token("u1"));

    let (first, _) = send(&state, ws_request(&uri, [192, 0, 2, 9], "203.0.113.1")).await;
    let (second, body) = send(&state, ws_request(&uri, [192, 0, 2, 9], "203.0.113.2")).await;

    assert_ne!(first, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn trusted_proxy_keys_on_the_forwarded_client() {
    let state = make_state(HubConfig {
        connection_limit: RateLimitConfig::new(1, Duration::from_secs(60)),
        trust_forwarded_for: true,
        ..HubConfig::default()
    });
    let uri = format!("/ws?token={}", token("u1"));
    let proxy = [10, 0, 0, 1];

    let (first, _) = send(&state, ws_request(&uri, proxy, "203.0.113.1")).await;
    let (second, _) = send(&state, ws_request(&uri, proxy, "203.0.113.2")).await;
    let (repeat, _) = send(&state, ws_request(&uri, proxy, "203.0.113.1")).await;

    assert_ne!(first, StatusCode::TOO_MANY_REQUESTS);
    assert_ne!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(repeat, StatusCode::TOO_MANY_REQUESTS);
}
