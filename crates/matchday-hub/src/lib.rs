//! Per-process broadcast hub for the Matchday simulation.
//!
//! This crate provides the socket side of the live-update pipeline:
//!
//! - **Sessions and rooms** ([`hub`]): authenticated sessions join
//!   `match:<id>`, `league:<id>`, and their own `user:<id>` room.
//! - **Dispatch** ([`message`]): `{event, data}` frames resolved through a
//!   closed lookup table, with field-level validation.
//! - **Admission** ([`auth`], [`ws`]): bearer token verification and
//!   per-address and per-(session, event) rate limits.
//! - **Admin HTTP** ([`handlers`]): `/health`, `/broadcast`, `/send`.
//!
//! Cross-process delivery is not handled here. A [`RoomPublisher`]
//! installed on the hub receives every accepted broadcast; the
//! `matchday-fanout` crate provides one backed by a pub/sub broker.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod message;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use auth::{JwtVerifier, TokenVerifier};
pub use config::HubConfig;
pub use error::HubError;
pub use hub::{BroadcastHub, RoomMessage, RoomPublisher};
pub use message::{MessageKind, ServerMessage};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, spawn_server};
pub use state::AppState;
