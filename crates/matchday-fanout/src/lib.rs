//! Cross-process fan-out for the Matchday broadcast hub.
//!
//! Each server process runs its own [`BroadcastHub`]; clients following
//! the same match may be attached to different processes. The
//! [`ClusterFanoutAdapter`] mirrors every local room broadcast onto a
//! shared pub/sub channel and replays everything it hears from sibling
//! hubs into the local one.
//!
//! # Modules
//!
//! - [`broker`] -- [`Broker`] trait and the in-process [`InMemoryBroker`].
//! - [`redis`] -- [`RedisBroker`] over `fred`, with separate publisher and
//!   subscriber clients.
//! - [`adapter`] -- [`ClusterFanoutAdapter`]: connect, adapt, disconnect.
//!
//! [`BroadcastHub`]: matchday_hub::BroadcastHub

pub mod adapter;
pub mod broker;
pub mod config;
pub mod error;
pub mod redis;

pub use adapter::{ClusterFanoutAdapter, PUBLISH_BREAKER_KEY};
pub use broker::{Broker, InMemoryBroker};
pub use config::FanoutConfig;
pub use error::FanoutError;
pub use redis::RedisBroker;
