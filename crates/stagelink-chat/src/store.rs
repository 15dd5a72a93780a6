// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciled multi-channel chat state.
//!
//! [`ChannelStateStore`] is the single source of truth the UI observes. It is
//! split into independent sub-states ([`MessageState`], [`IndicatorState`],
//! [`CooldownState`], [`BannerState`]) so the router can borrow exactly the
//! capabilities a handler needs; see [`Mutators`](crate::router::Mutators).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use stagelink_core::{ChannelId, ChatMessage, Mode, Selection};

/// Per-channel message lists, unread counters, and the active selection.
pub struct MessageState {
    local_user: u64,
    channels: HashMap<ChannelId, Vec<ChatMessage>>,
    unread: HashMap<ChannelId, u32>,
    selection: Selection,
}

impl MessageState {
    fn new(local_user: u64) -> Self {
        Self {
            local_user,
            channels: HashMap::new(),
            unread: HashMap::new(),
            selection: Selection::None,
        }
    }

    pub fn local_user(&self) -> u64 {
        self.local_user
    }

    /// Messages for one channel, in arrival/server order.
    pub fn messages(&self, channel: &ChannelId) -> &[ChatMessage] {
        self.channels.get(channel).map_or(&[], Vec::as_slice)
    }

    /// Append a message, or patch the stored entry when the id already
    /// exists in its channel. Patching never duplicates and never counts as
    /// unread.
    ///
    /// Peer messages count as unread only while their channel is not the
    /// active selection: the user is already looking at the selected
    /// channel, so its counter stays at zero instead of accumulating and
    /// being cleared on the next select.
    pub fn append(&mut self, message: ChatMessage) {
        let channel = message.channel.clone();
        let entries = self.channels.entry(channel.clone()).or_default();

        if let Some(existing) = entries.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
            return;
        }

        let from_peer = message.sender_id != self.local_user;
        entries.push(message);

        // The selected channel is being looked at; its counter stays put.
        if from_peer && self.selection.channel().as_ref() != Some(&channel) {
            *self.unread.entry(channel).or_insert(0) += 1;
        }
    }

    /// Replace a channel's list wholesale (history hydration).
    pub fn replace_channel(&mut self, channel: ChannelId, messages: Vec<ChatMessage>) {
        self.channels.insert(channel, messages);
    }

    pub fn unread(&self, channel: &ChannelId) -> u32 {
        self.unread.get(channel).copied().unwrap_or(0)
    }

    /// Set the single active selection and zero the corresponding channel's
    /// unread counter in the same step.
    pub fn select(&mut self, selection: Selection) {
        self.selection = selection;
        if let Some(channel) = selection.channel() {
            self.unread.insert(channel, 0);
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Attach a tracking id to the most recent locally authored message in
    /// `channel` that has none. Returns false when no candidate exists.
    pub fn attach_tracking(&mut self, channel: &ChannelId, tracking_id: &str) -> bool {
        let Some(entries) = self.channels.get_mut(channel) else {
            return false;
        };
        for message in entries.iter_mut().rev() {
            if message.sender_id == self.local_user && message.meta.tracking_id.is_none() {
                message.meta.tracking_id = Some(tracking_id.to_string());
                return true;
            }
        }
        false
    }

    /// Patch every message sharing `tracking_id`, across channels and
    /// senders. Returns the number of messages updated.
    pub fn patch_tracking(&mut self, tracking_id: &str, status: &str) -> usize {
        let mut patched = 0;
        for entries in self.channels.values_mut() {
            for message in entries.iter_mut() {
                if message.meta.tracking_id.as_deref() == Some(tracking_id) {
                    message.meta.escalation_status = Some(status.to_string());
                    patched += 1;
                }
            }
        }
        patched
    }
}

/// Typing indicator and the send gate.
#[derive(Default)]
pub struct IndicatorState {
    typing: Option<String>,
    awaiting_reply: bool,
}

impl IndicatorState {
    /// Display name of whoever is typing, if anyone.
    pub fn typing(&self) -> Option<&str> {
        self.typing.as_deref()
    }

    pub fn set_typing(&mut self, name: impl Into<String>) {
        self.typing = Some(name.into());
    }

    pub fn clear_typing(&mut self) {
        self.typing = None;
    }

    /// While set, further ai/admin sends are rejected, not queued.
    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn set_awaiting_reply(&mut self, awaiting: bool) {
        self.awaiting_reply = awaiting;
    }
}

/// Active rate-limit cooldowns by category.
///
/// Entries are queried against a caller-supplied instant; expired entries
/// read as cleared without any sweeping.
#[derive(Default)]
pub struct CooldownState {
    entries: HashMap<String, DateTime<Utc>>,
}

impl CooldownState {
    pub fn set(&mut self, category: impl Into<String>, expires_at: DateTime<Utc>) {
        self.entries.insert(category.into(), expires_at);
    }

    pub fn set_for(&mut self, category: impl Into<String>, retry_after_secs: i64) {
        self.set(category, Utc::now() + Duration::seconds(retry_after_secs));
    }

    pub fn active(&self, category: &str, now: DateTime<Utc>) -> bool {
        self.entries.get(category).is_some_and(|at| *at > now)
    }

    pub fn expires_at(&self, category: &str) -> Option<DateTime<Utc>> {
        self.entries.get(category).copied()
    }
}

/// Dismissible error banner.
#[derive(Default)]
pub struct BannerState {
    message: Option<String>,
}

impl BannerState {
    pub fn set(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn dismiss(&mut self) {
        self.message = None;
    }

    pub fn current(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// The full chat state for one client.
pub struct ChannelStateStore {
    pub messages: MessageState,
    pub indicators: IndicatorState,
    pub cooldowns: CooldownState,
    pub banner: BannerState,
    mode: Mode,
}

impl ChannelStateStore {
    pub fn new(local_user: u64) -> Self {
        Self {
            messages: MessageState::new(local_user),
            indicators: IndicatorState::default(),
            cooldowns: CooldownState::default(),
            banner: BannerState::default(),
            mode: Mode::Ai,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// All capabilities at once, for live dispatch.
    pub fn mutators(&mut self) -> crate::router::Mutators<'_> {
        crate::router::Mutators {
            messages: Some(&mut self.messages),
            indicators: Some(&mut self.indicators),
            cooldowns: Some(&mut self.cooldowns),
            banner: Some(&mut self.banner),
        }
    }
}
