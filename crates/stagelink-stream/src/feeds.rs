// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Constructors for the platform's fixed SSE feeds.
//!
//! Each feed pins its endpoint path and its closed set of acceptable
//! event-type names; everything else (policy, refresh bus, credentials)
//! stays caller-configurable through the returned builder.

use crate::stream::EventStreamBuilder;

/// Event types published on the dashboard statistics feed.
pub const DASHBOARD_EVENTS: &[&str] = &["stats_update", "leaderboard_update"];

/// Event types published on a per-team game-update feed.
pub const GAME_EVENTS: &[&str] = &["game_update", "progress_update"];

/// Live dashboard statistics for the whole event.
pub fn dashboard_stats(base: &str) -> EventStreamBuilder {
    EventStreamBuilder::new(format!("{}/events/dashboard-stats", base.trim_end_matches('/')))
        .event_types(DASHBOARD_EVENTS.iter().copied())
}

/// Game-progress updates scoped to one team.
pub fn team_game_updates(base: &str, team_id: u64) -> EventStreamBuilder {
    EventStreamBuilder::new(format!(
        "{}/events/teams/{team_id}/game-updates",
        base.trim_end_matches('/')
    ))
    .event_types(GAME_EVENTS.iter().copied())
}
