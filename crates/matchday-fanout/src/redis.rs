//! Redis (or `Dragonfly`) pub/sub broker.
//!
//! A Redis connection in subscriber mode cannot issue other commands, so
//! the broker holds two clients: a regular [`Client`] for `PUBLISH` and a
//! [`SubscriberClient`] that re-subscribes to its channels after every
//! reconnect. Both reconnect with exponential backoff, and their error
//! and reconnect events are logged rather than surfaced to callers.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use fred::clients::SubscriberClient;
use fred::interfaces::EventInterface;
use fred::prelude::*;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::broker::{Broker, SUBSCRIPTION_BUFFER};
use crate::error::FanoutError;

/// Reconnect delays: 100 ms doubling up to 30 s, forever.
fn reconnect_policy() -> ReconnectPolicy {
    ReconnectPolicy::new_exponential(0, 100, 30_000, 2)
}

/// Broker backed by Redis pub/sub.
#[derive(Clone)]
pub struct RedisBroker {
    publisher: Client,
    subscriber: SubscriberClient,
    listeners: Arc<Once>,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker").finish_non_exhaustive()
    }
}

impl RedisBroker {
    /// Build clients for the Redis instance at `url`.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`. No connection is
    /// made until [`Broker::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::Config`] if the URL cannot be parsed.
    pub fn new(url: &str) -> Result<Self, FanoutError> {
        let config = Config::from_url(url)
            .map_err(|e| FanoutError::Config(format!("Invalid Redis URL: {e}")))?;

        let publisher = Builder::from_config(config.clone())
            .set_policy(reconnect_policy())
            .build()?;
        let subscriber = Builder::from_config(config)
            .set_policy(reconnect_policy())
            .build_subscriber_client()?;

        Ok(Self {
            publisher,
            subscriber,
            listeners: Arc::new(Once::new()),
        })
    }

    /// Log connection events from both clients. Registered once.
    fn watch_connections(&self) {
        self.listeners.call_once(|| {
            log_events(&self.publisher, "publisher");
            log_events(&self.subscriber, "subscriber");
        });
    }
}

fn log_events<C: EventInterface>(client: &C, label: &'static str) {
    let _errors = client.on_error(move |(error, server)| async move {
        warn!(client = label, server = ?server, error = %error, "Redis connection error");
        Ok(())
    });
    let _reconnects = client.on_reconnect(move |server| async move {
        info!(client = label, server = ?server, "Redis client reconnected");
        Ok(())
    });
}

#[async_trait]
impl Broker for RedisBroker {
    async fn connect(&self) -> Result<(), FanoutError> {
        self.watch_connections();
        if !self.publisher.is_connected() {
            let _connection = self.publisher.init().await?;
        }
        if !self.subscriber.is_connected() {
            let _connection = self.subscriber.init().await?;
            let _resubscribe = self.subscriber.manage_subscriptions();
        }
        info!("Connected to Redis broker");
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), FanoutError> {
        let receivers: i64 = self.publisher.publish(channel, payload).await?;
        debug!(channel, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, FanoutError> {
        // Take the receiver before subscribing so nothing published in
        // between is missed.
        let mut messages = self.subscriber.message_rx();
        self.subscriber.subscribe(channel).await?;

        info!(channel, "Subscribed to Redis channel");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = channel.to_owned();

        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => {
                        if &*message.channel != channel.as_str() {
                            continue;
                        }
                        match message.value.convert::<String>() {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(channel = %channel, error = %e, "Dropping non-text pub/sub payload"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(channel = %channel, skipped = n, "Redis subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(channel = %channel, "Redis message stream closed");
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<(), FanoutError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis broker closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn bad_url_is_a_config_error() {
        let err = RedisBroker::new("not a url").unwrap_err();
        assert!(matches!(err, FanoutError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_connect_without_panicking() {
        // Nothing listens on port 1; the initial connect fails fast.
        let broker = RedisBroker::new("redis://127.0.0.1:1").unwrap();

        for _ in 0..2 {
            let result = tokio::time::timeout(Duration::from_secs(10), broker.connect()).await;
            assert!(matches!(result, Ok(Err(_))));
        }
        assert!(broker.listeners.is_completed());
    }
}
