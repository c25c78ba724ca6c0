//! Bridges a local [`BroadcastHub`] to its siblings through a [`Broker`].
//!
//! Every broadcast the hub accepts is queued for a single publish task,
//! which serializes it as a [`RoomMessage`] envelope and publishes it
//! through the `broker:publish` circuit breaker. One publisher per hub
//! keeps per-room order intact. A receive task replays envelopes from
//! other hubs into the local hub; envelopes carrying this hub's own
//! node id were already delivered locally and are skipped.
//!
//! While the breaker is open, local delivery continues and mirroring is
//! skipped with a warning.

use std::sync::{Arc, Mutex, PoisonError};

use matchday_hub::{BroadcastHub, RoomMessage, RoomPublisher};
use matchday_resilience::{
    CircuitBreaker, CircuitError, ResilienceRegistry, RetryConfig, retry_with_backoff,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::config::FanoutConfig;
use crate::error::FanoutError;

/// Registry key of the breaker guarding broker publishes.
pub const PUBLISH_BREAKER_KEY: &str = "broker:publish";

/// Hands accepted broadcasts to the publish task without blocking.
struct QueuedPublisher {
    tx: mpsc::Sender<RoomMessage>,
}

impl RoomPublisher for QueuedPublisher {
    fn publish(&self, message: RoomMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(room = %message.room, event = %message.event, "Publish queue full, not mirroring broadcast");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Publish queue closed");
            }
        }
    }
}

#[derive(Default)]
struct Attachment {
    hub: Option<Arc<BroadcastHub>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Cross-process fan-out for one hub.
pub struct ClusterFanoutAdapter {
    broker: Arc<dyn Broker>,
    config: FanoutConfig,
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    attachment: Mutex<Attachment>,
}

impl std::fmt::Debug for ClusterFanoutAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterFanoutAdapter")
            .field("config", &self.config)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl ClusterFanoutAdapter {
    /// Create an adapter over `broker`, using the shared retry policy and
    /// `broker:publish` breaker from `registry`.
    pub fn new(broker: Arc<dyn Broker>, config: FanoutConfig, registry: &ResilienceRegistry) -> Self {
        Self {
            broker,
            config,
            retry: registry.retry_config().clone(),
            breaker: registry.breaker(PUBLISH_BREAKER_KEY),
            attachment: Mutex::new(Attachment::default()),
        }
    }

    /// Connect the broker, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::Connect`] once retries are exhausted, or the
    /// underlying error if it is not transient.
    pub async fn connect(&self) -> Result<(), FanoutError> {
        retry_with_backoff(&self.retry, FanoutError::is_transient, || self.broker.connect())
            .await
            .map_err(|e| FanoutError::Connect {
                attempts: e.attempts(),
                reason: e.to_string(),
            })?;
        info!(channel = %self.config.channel, "Fan-out connected");
        Ok(())
    }

    /// Start mirroring `hub` to the cluster and replaying the cluster into it.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError`] if the broker subscription fails.
    pub async fn adapt(&self, hub: Arc<BroadcastHub>) -> Result<(), FanoutError> {
        let subscription = self.broker.subscribe(&self.config.channel).await?;
        let (tx, rx) = mpsc::channel(self.config.publish_buffer.max(1));

        let publish_task = tokio::spawn(publish_loop(
            rx,
            Arc::clone(&self.broker),
            Arc::clone(&self.breaker),
            self.config.channel.clone(),
        ));
        let receive_task = tokio::spawn(receive_loop(subscription, Arc::clone(&hub)));

        hub.set_publisher(Some(Arc::new(QueuedPublisher { tx })));
        info!(node = %hub.node_id(), channel = %self.config.channel, "Hub attached to cluster fan-out");

        let previous = {
            let mut attachment = self.lock();
            let previous = std::mem::take(&mut *attachment);
            attachment.hub = Some(hub);
            attachment.tasks = vec![publish_task, receive_task];
            previous
        };
        for task in previous.tasks {
            task.abort();
        }
        Ok(())
    }

    /// Detach the hub and close the broker.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError`] if closing the broker fails.
    pub async fn disconnect(&self) -> Result<(), FanoutError> {
        let attachment = std::mem::take(&mut *self.lock());
        if let Some(hub) = attachment.hub {
            hub.set_publisher(None);
        }
        for task in attachment.tasks {
            task.abort();
        }
        self.broker.close().await?;
        info!("Fan-out disconnected");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Attachment> {
        self.attachment.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn publish_loop(
    mut rx: mpsc::Receiver<RoomMessage>,
    broker: Arc<dyn Broker>,
    breaker: Arc<CircuitBreaker>,
    channel: String,
) {
    while let Some(message) = rx.recv().await {
        let payload = match serde_json::to_string(&message) {
            Ok(p) => p,
            Err(e) => {
                warn!(room = %message.room, "Failed to serialize broadcast envelope: {e}");
                continue;
            }
        };
        match breaker.call(|| broker.publish(&channel, payload)).await {
            Ok(()) => {}
            Err(CircuitError::Open { retry_after, .. }) => {
                warn!(room = %message.room, ?retry_after, "Broker circuit open, broadcast delivered locally only");
            }
            Err(CircuitError::Failed(e)) => {
                warn!(room = %message.room, error = %e, "Broker publish failed, broadcast delivered locally only");
            }
        }
    }
}

async fn receive_loop(mut subscription: mpsc::Receiver<String>, hub: Arc<BroadcastHub>) {
    while let Some(payload) = subscription.recv().await {
        let message: RoomMessage = match serde_json::from_str(&payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("Dropping malformed broadcast envelope: {e}");
                continue;
            }
        };
        if message.origin == hub.node_id() {
            continue;
        }
        let delivered = hub.deliver_local(&message);
        debug!(origin = %message.origin, room = %message.room, delivered, "Replayed remote broadcast");
    }
    debug!(node = %hub.node_id(), "Broker subscription ended");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use matchday_hub::{HubConfig, ServerMessage};
    use matchday_resilience::{CircuitBreakerConfig, CircuitState, ResilienceConfig};
    use matchday_types::{RoomKey, UserId};
    use serde_json::json;

    use super::*;
    use crate::broker::InMemoryBroker;

    fn registry() -> ResilienceRegistry {
        ResilienceRegistry::new(ResilienceConfig {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 10,
                max_delay_ms: 50,
                jitter: false,
                ..RetryConfig::default()
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                reset_timeout_ms: 60_000,
            },
        })
    }

    async fn next_frame(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn broadcast_on_one_hub_reaches_member_on_another() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
        let registry = registry();
        let hub_a = Arc::new(BroadcastHub::new("node-a", HubConfig::default(), &registry));
        let hub_b = Arc::new(BroadcastHub::new("node-b", HubConfig::default(), &registry));

        let adapter_a = ClusterFanoutAdapter::new(Arc::clone(&broker), FanoutConfig::default(), &registry);
        let adapter_b = ClusterFanoutAdapter::new(Arc::clone(&broker), FanoutConfig::default(), &registry);
        adapter_a.connect().await.unwrap();
        adapter_a.adapt(Arc::clone(&hub_a)).await.unwrap();
        adapter_b.adapt(Arc::clone(&hub_b)).await.unwrap();

        let (follower, mut rx) = hub_a.connect(UserId::new("u1"));
        hub_a
            .handle_text(follower, r#"{"event":"join:match","data":{"matchId":"123","userId":"u1"}}"#);
        assert_eq!(next_frame(&mut rx).await.event, "joined:match");

        // The reporter on B never joined the room; only the mirror can reach A.
        let (reporter, mut rx_b) = hub_b.connect(UserId::new("u2"));
        hub_b.handle_text(
            reporter,
            r#"{"event":"match:event","data":{"matchId":"123","event":"goal","payload":{"minute":12}}}"#,
        );
        let room: RoomKey = "match:123".parse().unwrap();
        assert_eq!(hub_b.room_size(&room), 0);

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.event, "match:event");
        assert_eq!(frame.data["event"], "goal");
        assert_eq!(frame.data["payload"]["minute"], 12);
        assert!(frame.data["timestamp"].is_string());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn own_broadcasts_are_delivered_exactly_once() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
        let registry = registry();
        let hub = Arc::new(BroadcastHub::new("node-a", HubConfig::default(), &registry));
        let adapter = ClusterFanoutAdapter::new(Arc::clone(&broker), FanoutConfig::default(), &registry);
        adapter.adapt(Arc::clone(&hub)).await.unwrap();

        let (_session, mut rx) = hub.connect(UserId::new("u1"));
        hub.send_to_user(&UserId::new("u1"), "first", json!(1));
        hub.send_to_user(&UserId::new("u1"), "second", json!(2));

        assert_eq!(next_frame(&mut rx).await.event, "first");
        assert_eq!(next_frame(&mut rx).await.event, "second");

        // Give an echoed envelope time to arrive; none should.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_stops_mirroring() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
        let registry = registry();
        let hub_a = Arc::new(BroadcastHub::new("node-a", HubConfig::default(), &registry));
        let hub_b = Arc::new(BroadcastHub::new("node-b", HubConfig::default(), &registry));
        let adapter_a = ClusterFanoutAdapter::new(Arc::clone(&broker), FanoutConfig::default(), &registry);
        let adapter_b = ClusterFanoutAdapter::new(Arc::clone(&broker), FanoutConfig::default(), &registry);
        adapter_a.adapt(Arc::clone(&hub_a)).await.unwrap();
        adapter_b.adapt(Arc::clone(&hub_b)).await.unwrap();

        let (_session, mut rx) = hub_a.connect(UserId::new("u1"));
        adapter_b.disconnect().await.unwrap();
        hub_b.send_to_user(&UserId::new("u1"), "lost", json!(null));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    /// Broker whose connects and publishes fail a set number of times.
    struct Flaky {
        connect_failures: AtomicU32,
        publishes: AtomicU32,
    }

    #[async_trait]
    impl Broker for Flaky {
        async fn connect(&self) -> Result<(), FanoutError> {
            let left = self.connect_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.connect_failures.store(left.saturating_sub(1), Ordering::SeqCst);
                return Err(FanoutError::Redis(fred::error::Error::new(
                    fred::error::ErrorKind::IO,
                    "connection refused",
                )));
            }
            Ok(())
        }

        async fn publish(&self, _channel: &str, _payload: String) -> Result<(), FanoutError> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Err(FanoutError::Closed)
        }

        async fn subscribe(&self, _channel: &str) -> Result<mpsc::Receiver<String>, FanoutError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn close(&self) -> Result<(), FanoutError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_transient_failures() {
        let flaky = Arc::new(Flaky {
            connect_failures: AtomicU32::new(2),
            publishes: AtomicU32::new(0),
        });
        let adapter = ClusterFanoutAdapter::new(flaky, FanoutConfig::default(), &registry());
        assert!(adapter.connect().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_after_retries() {
        let flaky = Arc::new(Flaky {
            connect_failures: AtomicU32::new(10),
            publishes: AtomicU32::new(0),
        });
        let adapter = ClusterFanoutAdapter::new(flaky, FanoutConfig::default(), &registry());
        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, FanoutError::Connect { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn failing_publishes_open_the_breaker_but_local_delivery_continues() {
        let flaky = Arc::new(Flaky {
            connect_failures: AtomicU32::new(0),
            publishes: AtomicU32::new(0),
        });
        let registry = registry();
        let hub = Arc::new(BroadcastHub::new("node-a", HubConfig::default(), &registry));
        let adapter = ClusterFanoutAdapter::new(
            Arc::clone(&flaky) as Arc<dyn Broker>,
            FanoutConfig::default(),
            &registry,
        );
        adapter.adapt(Arc::clone(&hub)).await.unwrap();
        let (_session, mut rx) = hub.connect(UserId::new("u1"));

        for n in 0..4 {
            hub.send_to_user(&UserId::new("u1"), "tick", json!(n));
        }
        for _ in 0..4 {
            assert_eq!(next_frame(&mut rx).await.event, "tick");
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let breaker = registry.breaker(PUBLISH_BREAKER_KEY);
        assert_eq!(breaker.state(), CircuitState::Open);
        // Calls after the threshold never reach the broker.
        assert_eq!(flaky.publishes.load(Ordering::SeqCst), 2);
    }
}
