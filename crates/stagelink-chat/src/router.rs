// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message routing.
//!
//! [`MessageRouter::dispatch`] looks the frame's `type` tag up in a fixed
//! table and applies the handler against a [`Mutators`] capability set.
//! Unknown types are a logged no-op, and a handler error is caught and
//! logged; dispatch never panics and never propagates failure into the
//! connection.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use stagelink_core::{ChannelId, ChatMessage, IdSource, InboundFrame, StagelinkError};

use crate::store::{BannerState, CooldownState, IndicatorState, MessageState};

/// The sub-state references a dispatch call makes available.
///
/// Every field is optional: handlers feature-detect each capability and
/// degrade to a logged skip when one is absent, so a partial embedding (a
/// notification widget with no cooldown state, say) still routes safely.
pub struct Mutators<'a> {
    pub messages: Option<&'a mut MessageState>,
    pub indicators: Option<&'a mut IndicatorState>,
    pub cooldowns: Option<&'a mut CooldownState>,
    pub banner: Option<&'a mut BannerState>,
}

impl Mutators<'_> {
    pub fn none() -> Self {
        Mutators {
            messages: None,
            indicators: None,
            cooldowns: None,
            banner: None,
        }
    }
}

/// Routes inbound frames to state mutations.
pub struct MessageRouter {
    viewer_id: u64,
    viewer_role: String,
    admin_roles: HashSet<String>,
    ids: Arc<dyn IdSource>,
}

impl MessageRouter {
    pub fn new(
        viewer_id: u64,
        viewer_role: impl Into<String>,
        admin_roles: impl IntoIterator<Item = String>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            viewer_id,
            viewer_role: viewer_role.into(),
            admin_roles: admin_roles.into_iter().collect(),
            ids,
        }
    }

    fn is_admin_role(&self, role: &str) -> bool {
        self.admin_roles.contains(role)
    }

    fn viewer_is_admin(&self) -> bool {
        self.is_admin_role(&self.viewer_role)
    }

    /// Dispatch one frame. Infallible by contract: failures are logged.
    pub fn dispatch(&self, frame: &InboundFrame, mutators: &mut Mutators<'_>) {
        let result = match frame.kind.as_str() {
            "ai_response" => self.content_response(frame, mutators, ChannelId::Ai, "assistant"),
            "admin_response" => self.content_response(frame, mutators, ChannelId::Admin, "admin"),
            "typing" => self.typing(frame, mutators),
            "rate_limit" => self.rate_limit(frame, mutators),
            "security_warning" => self.security_warning(frame, mutators),
            "escalation_created" => self.escalation_created(frame, mutators),
            "escalation_status" => self.escalation_status(frame, mutators),
            "team_broadcast_message" => self.team_broadcast(frame, mutators),
            "team_private_message" => self.team_private(frame, mutators),
            "broadcast_sent" => self.broadcast_sent(frame, mutators),
            "error" => self.server_error(frame, mutators),
            other => {
                // Forward compatible: servers may introduce new types.
                debug!(kind = other, "unrecognized message type ignored");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(kind = %frame.kind, error = %e, "message handler failed");
        }
    }

    fn require_str<'f>(frame: &'f InboundFrame, key: &str) -> Result<&'f str, StagelinkError> {
        frame
            .str_field(key)
            .ok_or_else(|| StagelinkError::protocol(format!("missing `{key}` field")))
    }

    /// ai_response / admin_response: content delivery. The stored message
    /// gets a locally generated id, never the server's conversation or
    /// session id.
    fn content_response(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
        channel: ChannelId,
        role: &str,
    ) -> Result<(), StagelinkError> {
        let content = Self::require_str(frame, "content")?;

        if let Some(messages) = m.messages.as_deref_mut() {
            let mut message = ChatMessage::new(
                self.ids.next_id(),
                channel,
                frame.u64_field("sender_id").unwrap_or(0),
                role,
                content,
            );
            message.meta.processing_ms = frame.u64_field("processing_ms");
            messages.append(message);
        } else {
            debug!(kind = %frame.kind, "message state unavailable, content dropped");
        }

        if let Some(indicators) = m.indicators.as_deref_mut() {
            indicators.clear_typing();
            indicators.set_awaiting_reply(false);
        }
        Ok(())
    }

    fn typing(&self, frame: &InboundFrame, m: &mut Mutators<'_>) -> Result<(), StagelinkError> {
        let Some(indicators) = m.indicators.as_deref_mut() else {
            debug!("indicator state unavailable, typing ignored");
            return Ok(());
        };

        let active = frame
            .get("active")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if active {
            indicators.set_typing(Self::require_str(frame, "user_name")?);
        } else {
            indicators.clear_typing();
        }
        Ok(())
    }

    fn rate_limit(&self, frame: &InboundFrame, m: &mut Mutators<'_>) -> Result<(), StagelinkError> {
        let category = frame.str_field("category").unwrap_or("chat");
        let retry_after = frame.u64_field("retry_after").unwrap_or(30);

        if let Some(cooldowns) = m.cooldowns.as_deref_mut() {
            cooldowns.set_for(category, retry_after as i64);
        } else {
            debug!("cooldown state unavailable, rate limit not recorded");
        }

        if let Some(messages) = m.messages.as_deref_mut() {
            let content = frame
                .str_field("message")
                .map(str::to_owned)
                .unwrap_or_else(|| {
                    format!("Rate limited: try again in {retry_after} seconds")
                });
            messages.append(ChatMessage::system(self.ids.next_id(), ChannelId::Ai, content));
        }

        if let Some(indicators) = m.indicators.as_deref_mut() {
            indicators.set_awaiting_reply(false);
        }
        Ok(())
    }

    fn security_warning(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let text = Self::require_str(frame, "message")?;

        if let Some(messages) = m.messages.as_deref_mut() {
            let mut message =
                ChatMessage::system(self.ids.next_id(), ChannelId::Ai, text);
            message.meta.flagged = true;
            messages.append(message);
        }

        if let Some(banner) = m.banner.as_deref_mut() {
            banner.set(text);
        } else {
            debug!("banner state unavailable, security warning not surfaced");
        }
        Ok(())
    }

    fn escalation_created(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let tracking_id = Self::require_str(frame, "tracking_id")?;
        let Some(messages) = m.messages.as_deref_mut() else {
            debug!("message state unavailable, escalation not attached");
            return Ok(());
        };

        if !messages.attach_tracking(&ChannelId::Ai, tracking_id) {
            debug!(tracking_id, "no untracked local message for escalation");
        }
        Ok(())
    }

    fn escalation_status(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let tracking_id = Self::require_str(frame, "tracking_id")?;
        let status = Self::require_str(frame, "status")?;
        let Some(messages) = m.messages.as_deref_mut() else {
            debug!("message state unavailable, escalation status dropped");
            return Ok(());
        };

        let patched = messages.patch_tracking(tracking_id, status);
        debug!(tracking_id, status, patched, "escalation status applied");
        Ok(())
    }

    /// Broadcasts from admin-role senders are redirected into the one-way
    /// admin-notifications channel for non-admin viewers; admin viewers see
    /// the raw broadcast stream.
    fn team_broadcast(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let content = Self::require_str(frame, "content")?;
        let sender_id = frame
            .u64_field("sender_id")
            .ok_or_else(|| StagelinkError::protocol("missing `sender_id` field"))?;
        let sender_role = frame.str_field("sender_role").unwrap_or("participant");

        let Some(messages) = m.messages.as_deref_mut() else {
            debug!("message state unavailable, broadcast dropped");
            return Ok(());
        };

        let redirect = self.is_admin_role(sender_role)
            && !self.viewer_is_admin()
            && sender_id != self.viewer_id;
        let channel = if redirect {
            ChannelId::AdminNotifications
        } else {
            ChannelId::Broadcast
        };

        let id = frame
            .str_field("id")
            .map(str::to_owned)
            .unwrap_or_else(|| self.ids.next_id());
        messages.append(ChatMessage::new(id, channel, sender_id, sender_role, content));
        Ok(())
    }

    fn team_private(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let content = Self::require_str(frame, "content")?;
        let sender_id = frame
            .u64_field("sender_id")
            .ok_or_else(|| StagelinkError::protocol("missing `sender_id` field"))?;
        let recipient_id = frame
            .u64_field("recipient_id")
            .ok_or_else(|| StagelinkError::protocol("missing `recipient_id` field"))?;

        let Some(messages) = m.messages.as_deref_mut() else {
            debug!("message state unavailable, private message dropped");
            return Ok(());
        };

        // Private conversations are keyed by the counterpart, whichever
        // direction the message travelled.
        let peer = if sender_id == self.viewer_id {
            recipient_id
        } else {
            sender_id
        };

        let id = frame
            .str_field("id")
            .map(str::to_owned)
            .unwrap_or_else(|| self.ids.next_id());
        let role = frame.str_field("sender_role").unwrap_or("participant");
        messages.append(ChatMessage::new(
            id,
            ChannelId::Private(peer),
            sender_id,
            role,
            content,
        ));
        Ok(())
    }

    /// Send-confirmation echo: an admin broadcasting to a team they are not
    /// a member of still sees their own message.
    fn broadcast_sent(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let content = Self::require_str(frame, "content")?;
        let Some(messages) = m.messages.as_deref_mut() else {
            debug!("message state unavailable, broadcast echo dropped");
            return Ok(());
        };

        messages.append(ChatMessage::new(
            self.ids.next_id(),
            ChannelId::Broadcast,
            self.viewer_id,
            self.viewer_role.clone(),
            content,
        ));
        Ok(())
    }

    fn server_error(
        &self,
        frame: &InboundFrame,
        m: &mut Mutators<'_>,
    ) -> Result<(), StagelinkError> {
        let text = frame.str_field("message").unwrap_or("server error");

        if let Some(banner) = m.banner.as_deref_mut() {
            banner.set(text);
        } else {
            debug!("banner state unavailable, server error not surfaced");
        }
        if let Some(indicators) = m.indicators.as_deref_mut() {
            indicators.set_awaiting_reply(false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChannelStateStore;
    use chrono::Utc;
    use serde_json::{json, Map};
    use stagelink_test_utils::SequentialIds;

    const VIEWER: u64 = 10;
    const ADMIN_SENDER: u64 = 99;

    fn frame(kind: &str, payload: serde_json::Value) -> InboundFrame {
        let Value::Object(map) = payload else {
            panic!("payload must be an object")
        };
        InboundFrame::new(kind, map)
    }

    fn router(viewer_role: &str) -> MessageRouter {
        MessageRouter::new(
            VIEWER,
            viewer_role,
            ["admin".to_string(), "organizer".to_string()],
            Arc::new(SequentialIds::new()),
        )
    }

    fn store() -> ChannelStateStore {
        ChannelStateStore::new(VIEWER)
    }

    #[test]
    fn ai_response_appends_with_local_id_and_clears_gate() {
        let router = router("participant");
        let mut store = store();
        store.indicators.set_awaiting_reply(true);
        store.indicators.set_typing("Assistant");

        router.dispatch(
            &frame(
                "ai_response",
                json!({"content": "hello", "session_id": "srv-555", "processing_ms": 120}),
            ),
            &mut store.mutators(),
        );

        let messages = store.messages.messages(&ChannelId::Ai);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "local-1", "server session id never reused");
        assert_eq!(messages[0].meta.processing_ms, Some(120));
        assert!(!store.indicators.awaiting_reply());
        assert!(store.indicators.typing().is_none());
    }

    #[test]
    fn unknown_type_is_a_no_op() {
        let router = router("participant");
        let mut store = store();

        router.dispatch(
            &frame("hologram_update", json!({"whatever": true})),
            &mut store.mutators(),
        );

        assert!(store.messages.messages(&ChannelId::Ai).is_empty());
        assert!(store.banner.current().is_none());
    }

    #[test]
    fn handler_error_is_caught_not_propagated() {
        let router = router("participant");
        let mut store = store();

        // Missing required `content`; dispatch must swallow the failure.
        router.dispatch(&frame("ai_response", json!({})), &mut store.mutators());
        assert!(store.messages.messages(&ChannelId::Ai).is_empty());
    }

    #[test]
    fn handlers_degrade_without_capabilities() {
        let router = router("participant");
        let mut empty = Mutators::none();

        router.dispatch(
            &frame("ai_response", json!({"content": "hi"})),
            &mut empty,
        );
        router.dispatch(
            &frame("rate_limit", json!({"retry_after": 5})),
            &mut empty,
        );
        router.dispatch(
            &frame("security_warning", json!({"message": "bad"})),
            &mut empty,
        );
    }

    #[test]
    fn typing_sets_and_clears() {
        let router = router("participant");
        let mut store = store();

        router.dispatch(
            &frame("typing", json!({"user_name": "Ada"})),
            &mut store.mutators(),
        );
        assert_eq!(store.indicators.typing(), Some("Ada"));

        router.dispatch(
            &frame("typing", json!({"active": false})),
            &mut store.mutators(),
        );
        assert!(store.indicators.typing().is_none());
    }

    #[test]
    fn rate_limit_records_cooldown_and_system_message() {
        let router = router("participant");
        let mut store = store();
        store.indicators.set_awaiting_reply(true);

        router.dispatch(
            &frame("rate_limit", json!({"category": "chat", "retry_after": 30})),
            &mut store.mutators(),
        );

        let now = Utc::now();
        assert!(store.cooldowns.active("chat", now));
        assert!(!store.cooldowns.active("chat", now + chrono::Duration::seconds(31)));

        let messages = store.messages.messages(&ChannelId::Ai);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].meta.system);
        assert!(!store.indicators.awaiting_reply());
    }

    #[test]
    fn security_warning_flags_message_and_sets_banner() {
        let router = router("participant");
        let mut store = store();

        router.dispatch(
            &frame("security_warning", json!({"message": "content flagged"})),
            &mut store.mutators(),
        );

        let messages = store.messages.messages(&ChannelId::Ai);
        assert!(messages[0].meta.flagged);
        assert_eq!(store.banner.current(), Some("content flagged"));
    }

    #[test]
    fn escalation_lifecycle_attaches_then_patches_everywhere() {
        let router = router("participant");
        let mut store = store();
        store.messages.append(ChatMessage::new(
            "mine".into(),
            ChannelId::Ai,
            VIEWER,
            "participant",
            "please help",
        ));

        router.dispatch(
            &frame("escalation_created", json!({"tracking_id": "esc-7"})),
            &mut store.mutators(),
        );
        assert_eq!(
            store.messages.messages(&ChannelId::Ai)[0]
                .meta
                .tracking_id
                .as_deref(),
            Some("esc-7")
        );

        // A second message elsewhere shares the tracking id.
        let mut other = ChatMessage::new(
            "theirs".into(),
            ChannelId::Admin,
            ADMIN_SENDER,
            "admin",
            "on it",
        );
        other.meta.tracking_id = Some("esc-7".into());
        store.messages.append(other);

        router.dispatch(
            &frame(
                "escalation_status",
                json!({"tracking_id": "esc-7", "status": "resolved"}),
            ),
            &mut store.mutators(),
        );

        assert_eq!(
            store.messages.messages(&ChannelId::Ai)[0]
                .meta
                .escalation_status
                .as_deref(),
            Some("resolved")
        );
        assert_eq!(
            store.messages.messages(&ChannelId::Admin)[0]
                .meta
                .escalation_status
                .as_deref(),
            Some("resolved")
        );
    }

    #[test]
    fn admin_broadcast_redirects_for_non_admin_viewer() {
        let router = router("participant");
        let mut store = store();

        router.dispatch(
            &frame(
                "team_broadcast_message",
                json!({
                    "content": "doors open at 9",
                    "sender_id": ADMIN_SENDER,
                    "sender_role": "organizer"
                }),
            ),
            &mut store.mutators(),
        );

        assert!(store.messages.messages(&ChannelId::Broadcast).is_empty());
        let notes = store.messages.messages(&ChannelId::AdminNotifications);
        assert_eq!(notes.len(), 1);
        assert_eq!(store.messages.unread(&ChannelId::AdminNotifications), 1);
    }

    #[test]
    fn admin_viewer_sees_raw_broadcast_stream() {
        let router = router("admin");
        let mut store = store();

        router.dispatch(
            &frame(
                "team_broadcast_message",
                json!({
                    "content": "doors open at 9",
                    "sender_id": ADMIN_SENDER,
                    "sender_role": "organizer"
                }),
            ),
            &mut store.mutators(),
        );

        assert_eq!(store.messages.messages(&ChannelId::Broadcast).len(), 1);
        assert!(store.messages.messages(&ChannelId::AdminNotifications).is_empty());
    }

    #[test]
    fn own_broadcast_never_counts_unread() {
        let router = router("participant");
        let mut store = store();

        router.dispatch(
            &frame(
                "team_broadcast_message",
                json!({"content": "me", "sender_id": VIEWER, "sender_role": "participant"}),
            ),
            &mut store.mutators(),
        );

        assert_eq!(store.messages.unread(&ChannelId::Broadcast), 0);
        assert_eq!(store.messages.messages(&ChannelId::Broadcast).len(), 1);
    }

    #[test]
    fn private_messages_key_on_the_counterpart() {
        let router = router("participant");
        let mut store = store();
        const PEER: u64 = 44;

        router.dispatch(
            &frame(
                "team_private_message",
                json!({"content": "hi", "sender_id": PEER, "recipient_id": VIEWER}),
            ),
            &mut store.mutators(),
        );
        router.dispatch(
            &frame(
                "team_private_message",
                json!({"content": "hello back", "sender_id": VIEWER, "recipient_id": PEER}),
            ),
            &mut store.mutators(),
        );

        let conversation = store.messages.messages(&ChannelId::Private(PEER));
        assert_eq!(conversation.len(), 2, "both directions share one channel");
        assert_eq!(store.messages.unread(&ChannelId::Private(PEER)), 1);
    }

    #[test]
    fn broadcast_sent_echoes_for_the_sender() {
        let router = router("admin");
        let mut store = store();

        router.dispatch(
            &frame("broadcast_sent", json!({"content": "announcement", "team_id": 3})),
            &mut store.mutators(),
        );

        let messages = store.messages.messages(&ChannelId::Broadcast);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, VIEWER);
        assert_eq!(store.messages.unread(&ChannelId::Broadcast), 0);
    }

    #[test]
    fn server_error_sets_banner_and_clears_gate() {
        let router = router("participant");
        let mut store = store();
        store.indicators.set_awaiting_reply(true);

        router.dispatch(
            &frame("error", json!({"message": "something broke"})),
            &mut store.mutators(),
        );

        assert_eq!(store.banner.current(), Some("something broke"));
        assert!(!store.indicators.awaiting_reply());
    }

    #[test]
    fn frame_without_payload_fields_uses_defaults() {
        let router = router("participant");
        let mut store = store();
        router.dispatch(
            &InboundFrame::new("error", Map::new()),
            &mut store.mutators(),
        );
        assert_eq!(store.banner.current(), Some("server error"));
    }
}
