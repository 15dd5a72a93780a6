// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Stagelink workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A logical conversation channel within the multiplexed socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    /// AI assistant conversation.
    Ai,
    /// Human-admin support conversation.
    Admin,
    /// Bidirectional team broadcast.
    Broadcast,
    /// Private conversation with a peer, keyed by the counterpart's id.
    Private(u64),
    /// One-way feed of messages authored by administrators.
    AdminNotifications,
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelId::Ai => write!(f, "ai"),
            ChannelId::Admin => write!(f, "admin"),
            ChannelId::Broadcast => write!(f, "broadcast"),
            ChannelId::Private(peer) => write!(f, "private:{peer}"),
            ChannelId::AdminNotifications => write!(f, "admin-notifications"),
        }
    }
}

/// Top-level conversation mode selected in the client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Ai,
    Admin,
    Team,
}

/// Which single conversation target is active.
///
/// Mutual exclusion is structural: selecting any variant replaces the
/// previous one, so at most one target is ever selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Broadcast,
    Private(u64),
    TeamBroadcast(u64),
    AdminNotifications,
    AdminContact(u64),
}

impl Selection {
    /// The channel whose unread counter this selection clears, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Selection::Broadcast => Some(ChannelId::Broadcast),
            Selection::Private(peer) => Some(ChannelId::Private(*peer)),
            Selection::AdminNotifications => Some(ChannelId::AdminNotifications),
            Selection::None | Selection::TeamBroadcast(_) | Selection::AdminContact(_) => None,
        }
    }
}

/// Connection lifecycle state, observable via a `watch` channel.
///
/// Written only by the owning connection's lifecycle code, never by
/// consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; terminal until the next explicit
    /// connect. Distinguishes giving up from an ordinary transient drop.
    Failed,
}

/// Open metadata attached to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Escalation tracking id, attached after an escalation is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,

    /// Current escalation status (pending, assigned, resolved, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_status: Option<String>,

    /// Server-reported processing time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_ms: Option<u64>,

    /// Set on messages flagged by a security/validation warning.
    #[serde(default)]
    pub flagged: bool,

    /// Set on locally generated system messages (rate limits, warnings).
    #[serde(default)]
    pub system: bool,
}

/// A single message in a conversation channel.
///
/// `id` is unique within its channel; appending a message whose id already
/// exists patches the stored entry instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel: ChannelId,
    pub sender_id: u64,
    pub sender_role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: MessageMeta,
}

impl ChatMessage {
    /// A message authored right now by the given sender.
    pub fn new(
        id: String,
        channel: ChannelId,
        sender_id: u64,
        sender_role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            channel,
            sender_id,
            sender_role: sender_role.into(),
            content: content.into(),
            created_at: Utc::now(),
            meta: MessageMeta::default(),
        }
    }

    /// A locally generated system message (sender id 0, role "system").
    pub fn system(id: String, channel: ChannelId, content: impl Into<String>) -> Self {
        let mut msg = Self::new(id, channel, 0, "system", content);
        msg.meta.system = true;
        msg
    }
}

/// A member of the local user's team, as returned by the history collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: u64,
    pub name: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_display() {
        assert_eq!(ChannelId::Ai.to_string(), "ai");
        assert_eq!(ChannelId::Private(42).to_string(), "private:42");
        assert_eq!(ChannelId::AdminNotifications.to_string(), "admin-notifications");
    }

    #[test]
    fn mode_round_trips_lowercase() {
        use std::str::FromStr;
        for mode in [Mode::Ai, Mode::Admin, Mode::Team] {
            let s = mode.to_string();
            assert_eq!(s, s.to_lowercase());
            assert_eq!(Mode::from_str(&s).unwrap(), mode);
        }
    }

    #[test]
    fn selection_maps_to_unread_channel() {
        assert_eq!(Selection::Broadcast.channel(), Some(ChannelId::Broadcast));
        assert_eq!(Selection::Private(7).channel(), Some(ChannelId::Private(7)));
        assert_eq!(
            Selection::AdminNotifications.channel(),
            Some(ChannelId::AdminNotifications)
        );
        assert_eq!(Selection::TeamBroadcast(3).channel(), None);
        assert_eq!(Selection::None.channel(), None);
    }

    #[test]
    fn system_message_is_marked() {
        let msg = ChatMessage::system("m1".into(), ChannelId::Ai, "rate limited");
        assert!(msg.meta.system);
        assert_eq!(msg.sender_role, "system");
        assert_eq!(msg.sender_id, 0);
    }
}
