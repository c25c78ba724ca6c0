//! Match engine binary for the Matchday simulation.
//!
//! This is the main entry point that wires together the broadcast hub,
//! cluster fan-out, the match store and the match lifecycle API, then
//! serves them on one listener until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `matchday-config.yaml` plus environment
//! 3. Build the resilience registry
//! 4. Create the broadcast hub
//! 5. Connect the broker (Redis when `REDIS_URL` is set, else in-process)
//!    and attach the hub to it
//! 6. Create the match store (seeded with demo fixtures if enabled)
//! 7. Serve the hub and match routes
//! 8. On Ctrl-C: abandon live matches, detach the broker, clear registries

mod broadcaster;
mod config;
mod error;
mod fixtures;
mod routes;
mod service;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use matchday_core::repository::{InMemoryMatchRepository, StubStandingsUpdater};
use matchday_fanout::{Broker, ClusterFanoutAdapter, InMemoryBroker, RedisBroker};
use matchday_hub::{AppState, BroadcastHub, JwtVerifier, build_router, spawn_server};
use matchday_resilience::ResilienceRegistry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::MatchdayConfig;
use crate::error::EngineError;
use crate::service::MatchService;
use crate::store::MatchStore;

/// How often expired rate-limit windows are dropped.
const LIMITER_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Application entry point for the match engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("matchday-engine starting");

    // 2. Load configuration.
    let config = MatchdayConfig::load(Path::new("matchday-config.yaml"))
        .map_err(EngineError::from)?;
    config.validate().map_err(EngineError::from)?;
    let node_id = config.infrastructure.resolved_node_id();
    info!(
        node_id = %node_id,
        port = config.infrastructure.port,
        minute_interval_ms = config.simulation.minute_interval_ms,
        clustered = config.infrastructure.redis_url.is_some(),
        "Configuration loaded"
    );

    // 3. Resilience registry.
    let registry = Arc::new(ResilienceRegistry::new(config.resilience.clone()));
    spawn_limiter_purge(Arc::clone(&registry));

    // 4. Broadcast hub.
    let hub = Arc::new(BroadcastHub::new(node_id.as_str(), config.hub.clone(), &registry));

    // 5. Cluster fan-out.
    let broker: Arc<dyn Broker> = match &config.infrastructure.redis_url {
        Some(url) => {
            info!(redis_url = %url, "Using Redis broker");
            Arc::new(RedisBroker::new(url).map_err(EngineError::from)?)
        }
        None => {
            info!("No REDIS_URL set, broadcasts stay in this process");
            Arc::new(InMemoryBroker::default())
        }
    };
    let adapter = ClusterFanoutAdapter::new(broker, config.infrastructure.fanout.clone(), &registry);
    adapter.connect().await.map_err(EngineError::from)?;
    adapter.adapt(Arc::clone(&hub)).await.map_err(EngineError::from)?;

    // 6. Match store and lifecycle service.
    let matches = Arc::new(InMemoryMatchRepository::new());
    if config.infrastructure.demo_fixtures {
        fixtures::seed(&matches).await;
    }
    let store = Arc::new(MatchStore::new(
        matches,
        Arc::new(StubStandingsUpdater::new()),
        &registry,
    ));
    let service = Arc::new(MatchService::new(
        store,
        Arc::clone(&hub),
        config.simulation.clone(),
    ));

    // 7. Serve.
    let app_state = Arc::new(AppState::new(
        Arc::clone(&hub),
        Arc::new(JwtVerifier::new(&config.hub.jwt_secret)),
    ));
    let router = build_router(app_state).merge(routes::match_router(Arc::clone(&service)));
    let server = spawn_server(&config.infrastructure.server(), router, shutdown_signal())
        .await
        .map_err(EngineError::from)?;
    info!(port = config.infrastructure.port, "Match engine ready");

    if let Err(e) = server.await {
        warn!(error = %e, "Server task ended abnormally");
    }

    // 8. Shutdown.
    info!(live_matches = service.running_count(), "Shutting down");
    service.shutdown().await;
    if let Err(e) = adapter.disconnect().await {
        warn!(error = %e, "Broker did not close cleanly");
    }
    registry.shutdown();

    info!("matchday-engine shutdown complete");
    Ok(())
}

/// Resolve when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown signal received");
}

/// Drop expired limiter windows periodically so per-address keys do not
/// accumulate.
fn spawn_limiter_purge(registry: Arc<ResilienceRegistry>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            registry.purge_expired();
        }
    });
}
