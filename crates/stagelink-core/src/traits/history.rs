// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History/REST collaborator seam.
//!
//! Each load is an idempotent read returning an ordered list that fully
//! replaces local state for that slice.

use async_trait::async_trait;

use crate::error::StagelinkError;
use crate::types::{ChatMessage, Mode, TeamMember};

/// Loads conversation history from the platform's REST surface.
#[async_trait]
pub trait HistoryLoader: Send + Sync {
    /// Message history for the `ai` or `admin` mode.
    async fn mode_history(&self, mode: Mode) -> Result<Vec<ChatMessage>, StagelinkError>;

    /// Private conversation with one peer.
    async fn conversation(&self, peer_id: u64) -> Result<Vec<ChatMessage>, StagelinkError>;

    /// Team broadcast history.
    async fn broadcast_history(&self) -> Result<Vec<ChatMessage>, StagelinkError>;

    /// Members of the local user's team.
    async fn team_members(&self) -> Result<Vec<TeamMember>, StagelinkError>;
}
