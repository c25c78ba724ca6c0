//! Shared application state for the hub's HTTP surface.

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::hub::BroadcastHub;

/// State injected into every hub handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// The process-local hub.
    pub hub: Arc<BroadcastHub>,
    /// Verifier for socket bearer tokens.
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Bundle a hub with its token verifier.
    pub fn new(hub: Arc<BroadcastHub>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { hub, verifier }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("hub", &self.hub).finish_non_exhaustive()
    }
}
