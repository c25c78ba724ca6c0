//! Demo fixtures for a standalone engine.
//!
//! Club and fixture data normally live in other services. When the engine
//! runs with its in-memory store, these give it something to simulate.

use chrono::{Duration, Utc};
use matchday_core::repository::InMemoryMatchRepository;
use matchday_types::{ClubId, LeagueId, MatchId, MatchState, PlayerId, Tactics, TeamSheet};

/// League the demo fixtures belong to.
pub const DEMO_LEAGUE: &str = "demo-league";

fn team(club: &str, formation: &str, attacking: u8, defending: u8, play_style: &str) -> TeamSheet {
    TeamSheet {
        club_id: ClubId::new(club),
        score: 0,
        lineup: (1..=11).map(|n| PlayerId::new(format!("{club}-{n}"))).collect(),
        tactics: Tactics {
            formation: formation.to_owned(),
            attacking,
            defending,
            play_style: play_style.to_owned(),
        },
    }
}

/// The demo fixture list, all `scheduled`.
pub fn demo_matches() -> Vec<MatchState> {
    let now = Utc::now();
    let kick_off = now.checked_add_signed(Duration::hours(1)).unwrap_or(now);
    [
        ("demo-1", team("harbour-city", "4-3-3", 70, 40, "possession"), team("moorland-town", "4-4-2", 45, 60, "counter")),
        ("demo-2", team("riverside", "3-5-2", 55, 55, "balanced"), team("northgate", "5-3-2", 30, 80, "defensive")),
        ("demo-3", team("old-quarry", "4-2-3-1", 60, 50, "pressing"), team("saltmarsh", "4-4-2", 50, 50, "balanced")),
    ]
    .into_iter()
    .map(|(id, home, away)| {
        let mut state = MatchState::scheduled(MatchId::new(id), home, away, kick_off);
        state.league_id = Some(LeagueId::new(DEMO_LEAGUE));
        state
    })
    .collect()
}

/// Insert the demo fixtures into `repo`.
pub async fn seed(repo: &InMemoryMatchRepository) -> usize {
    let matches = demo_matches();
    let count = matches.len();
    for state in matches {
        repo.insert(state).await;
    }
    tracing::info!(count, league = DEMO_LEAGUE, "Demo fixtures seeded");
    count
}
