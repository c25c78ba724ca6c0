//! Relay from a running match to its room and its stored record.
//!
//! The clock hands each [`MinuteUpdate`] to a bounded channel; the relay
//! drains it on its own task, so a slow store or a burst of followers
//! never delays the next minute. For every update it broadcasts one
//! `match:event` per new event followed by one `match:update`, then saves
//! the running snapshot. Store failures are logged and the relay carries
//! on; the final record is written by the match task once the clock stops.

use std::sync::Arc;

use chrono::Utc;
use matchday_hub::BroadcastHub;
use matchday_types::{HomeAway, MatchState, MinuteUpdate, RoomKey};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::MatchStore;

/// Event name for per-event pushes.
pub const MATCH_EVENT: &str = "match:event";

/// Event name for per-minute snapshots.
pub const MATCH_UPDATE: &str = "match:update";

/// Drains minute updates for one match.
#[derive(Debug)]
pub struct UpdateRelay {
    hub: Arc<BroadcastHub>,
    store: Arc<MatchStore>,
}

impl UpdateRelay {
    /// Relay into `hub`, persisting through `store`.
    pub const fn new(hub: Arc<BroadcastHub>, store: Arc<MatchStore>) -> Self {
        Self { hub, store }
    }

    /// Consume updates until the sender side closes.
    ///
    /// `snapshot` is the record as it was at kick-off; each update is
    /// folded into it before saving.
    pub async fn run(self, mut snapshot: MatchState, mut updates: mpsc::Receiver<MinuteUpdate>) {
        while let Some(update) = updates.recv().await {
            let delivered = publish_update(&self.hub, &update);
            debug!(match_id = %update.match_id, minute = update.minute, delivered, "Minute relayed");

            fold(&mut snapshot, update);
            if let Err(e) = self.store.save(&snapshot).await {
                warn!(match_id = %snapshot.id, minute = snapshot.progress.minute, error = %e, "Snapshot not saved");
            }
        }
        debug!(match_id = %snapshot.id, "Update relay finished");
    }
}

/// Broadcast `update` to its match room.
///
/// Returns the number of local frames queued.
pub fn publish_update(hub: &BroadcastHub, update: &MinuteUpdate) -> usize {
    let room = RoomKey::for_match(&update.match_id);
    let timestamp = Utc::now();
    let mut delivered: usize = 0;

    for event in &update.events {
        delivered = delivered.saturating_add(hub.broadcast_to_room(
            &room,
            MATCH_EVENT,
            json!({ "event": event.kind, "payload": event, "timestamp": timestamp }),
        ));
    }
    delivered.saturating_add(hub.broadcast_to_room(
        &room,
        MATCH_UPDATE,
        json!({ "matchId": update.match_id, "state": update, "timestamp": timestamp }),
    ))
}

/// An update carrying `state` as it stands, with no new events.
///
/// Sent when a match ends without a final paced minute: a batch run or a
/// cancellation.
pub fn closing_update(state: &MatchState) -> MinuteUpdate {
    MinuteUpdate {
        match_id: state.id.clone(),
        minute: state.progress.minute,
        score: HomeAway::new(state.home_team.score, state.away_team.score),
        events: Vec::new(),
        statistics: state.statistics.clone(),
        status: state.status,
        possession_totals: state.progress.possession_totals,
    }
}

/// Apply a minute's changes to a stored snapshot.
fn fold(snapshot: &mut MatchState, update: MinuteUpdate) {
    snapshot.home_team.score = update.score.home;
    snapshot.away_team.score = update.score.away;
    snapshot.events.extend(update.events);
    snapshot.statistics = update.statistics;
    snapshot.status = update.status;
    snapshot.progress.minute = update.minute;
    snapshot.progress.possession_totals = update.possession_totals;
}
