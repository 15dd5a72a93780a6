// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned history loader.

use std::collections::HashMap;

use async_trait::async_trait;

use stagelink_core::{ChatMessage, HistoryLoader, Mode, StagelinkError, TeamMember};

/// A [`HistoryLoader`] returning preset lists.
#[derive(Default)]
pub struct MockHistory {
    ai: Vec<ChatMessage>,
    admin: Vec<ChatMessage>,
    conversations: HashMap<u64, Vec<ChatMessage>>,
    broadcast: Vec<ChatMessage>,
    members: Vec<TeamMember>,
}

impl MockHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode, messages: Vec<ChatMessage>) -> Self {
        match mode {
            Mode::Ai => self.ai = messages,
            Mode::Admin => self.admin = messages,
            Mode::Team => {}
        }
        self
    }

    pub fn with_conversation(mut self, peer_id: u64, messages: Vec<ChatMessage>) -> Self {
        self.conversations.insert(peer_id, messages);
        self
    }

    pub fn with_broadcast(mut self, messages: Vec<ChatMessage>) -> Self {
        self.broadcast = messages;
        self
    }

    pub fn with_members(mut self, members: Vec<TeamMember>) -> Self {
        self.members = members;
        self
    }
}

#[async_trait]
impl HistoryLoader for MockHistory {
    async fn mode_history(&self, mode: Mode) -> Result<Vec<ChatMessage>, StagelinkError> {
        match mode {
            Mode::Ai => Ok(self.ai.clone()),
            Mode::Admin => Ok(self.admin.clone()),
            Mode::Team => Err(StagelinkError::Internal(
                "team mode has no single history slice".into(),
            )),
        }
    }

    async fn conversation(&self, peer_id: u64) -> Result<Vec<ChatMessage>, StagelinkError> {
        Ok(self.conversations.get(&peer_id).cloned().unwrap_or_default())
    }

    async fn broadcast_history(&self) -> Result<Vec<ChatMessage>, StagelinkError> {
        Ok(self.broadcast.clone())
    }

    async fn team_members(&self) -> Result<Vec<TeamMember>, StagelinkError> {
        Ok(self.members.clone())
    }
}
