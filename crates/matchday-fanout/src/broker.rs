//! Pub/sub broker abstraction.
//!
//! A [`Broker`] moves opaque string payloads between processes over
//! named channels. [`InMemoryBroker`] connects hubs inside one process
//! (single-node deployments and tests); [`RedisBroker`] connects hubs
//! across processes.
//!
//! [`RedisBroker`]: crate::redis::RedisBroker

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::FanoutError;

/// Payloads buffered per subscription before the forwarder waits.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 1_024;

/// Channel-based publish/subscribe transport.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish connections. Safe to call again after a failure.
    async fn connect(&self) -> Result<(), FanoutError>;

    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: String) -> Result<(), FanoutError>;

    /// Receive every payload published on `channel` from now on.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, FanoutError>;

    /// Close connections; open subscriptions end.
    async fn close(&self) -> Result<(), FanoutError>;
}

/// Broker that delivers within the current process.
#[derive(Debug)]
pub struct InMemoryBroker {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(SUBSCRIPTION_BUFFER)
    }
}

impl InMemoryBroker {
    /// Create a broker buffering `capacity` payloads per channel.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn ensure_open(&self) -> Result<(), FanoutError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FanoutError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> Result<(), FanoutError> {
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), FanoutError> {
        self.ensure_open()?;
        // No subscribers is not an error.
        let receivers = self.sender(channel).send(payload).unwrap_or(0);
        debug!(channel, receivers, "Published to in-memory broker");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, FanoutError> {
        self.ensure_open()?;
        let mut source = self.sender(channel).subscribe();
        let (tx, rx) = mpsc::channel(self.capacity);
        let channel = channel.to_owned();

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(channel = %channel, skipped = n, "In-memory subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<(), FanoutError> {
        self.closed.store(true, Ordering::Release);
        // Dropping the senders ends every subscription.
        self.channels.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_payloads_in_order() {
        let broker = InMemoryBroker::default();
        let mut a = broker.subscribe("rooms").await.unwrap();
        let mut b = broker.subscribe("rooms").await.unwrap();

        for n in 0..3 {
            broker.publish("rooms", format!("m{n}")).await.unwrap();
        }

        for rx in [&mut a, &mut b] {
            let mut got = Vec::new();
            for _ in 0..3 {
                got.push(rx.recv().await.unwrap());
            }
            assert_eq!(got, ["m0", "m1", "m2"]);
        }
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let broker = InMemoryBroker::default();
        let mut other = broker.subscribe("other").await.unwrap();
        broker.publish("rooms", String::from("x")).await.unwrap();
        broker.close().await.unwrap();
        assert_eq!(other.recv().await, None);
    }

    #[tokio::test]
    async fn closed_broker_rejects_publish() {
        let broker = InMemoryBroker::default();
        broker.close().await.unwrap();
        assert!(matches!(
            broker.publish("rooms", String::new()).await,
            Err(FanoutError::Closed)
        ));
        broker.connect().await.unwrap();
        assert!(broker.publish("rooms", String::new()).await.is_ok());
    }
}
