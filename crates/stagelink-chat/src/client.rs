// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound chat operations and history hydration.
//!
//! [`ChatClient`] ties the pieces together: the state store behind one lock,
//! the router installed as the socket's frame sink, the history collaborator
//! for hydration on mode/selection changes, and the outbound send rules
//! (local validation, optimistic echo, send gating).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use stagelink_core::{
    ChannelId, ChatMessage, FrameSink, HistoryLoader, IdSource, InboundFrame, Mode,
    OutboundFrame, Selection, StagelinkError, TeamMember,
};
use stagelink_socket::SocketSupervisor;

use crate::router::MessageRouter;
use crate::store::ChannelStateStore;

/// Dispatches inbound frames into the store under its lock, so live
/// dispatch and history replacement serialize against each other.
struct RouterSink {
    store: Arc<Mutex<ChannelStateStore>>,
    router: Arc<MessageRouter>,
}

impl FrameSink for RouterSink {
    fn on_frame(&self, frame: InboundFrame) {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        self.router.dispatch(&frame, &mut store.mutators());
    }
}

/// High-level chat operations over the supervised socket.
pub struct ChatClient {
    store: Arc<Mutex<ChannelStateStore>>,
    supervisor: Arc<SocketSupervisor>,
    history: Arc<dyn HistoryLoader>,
    ids: Arc<dyn IdSource>,
    viewer_id: u64,
    viewer_role: String,
}

impl ChatClient {
    /// Build the client and install its router as the socket's frame sink.
    pub fn new(
        supervisor: Arc<SocketSupervisor>,
        history: Arc<dyn HistoryLoader>,
        ids: Arc<dyn IdSource>,
        viewer_id: u64,
        viewer_role: impl Into<String>,
        admin_roles: impl IntoIterator<Item = String>,
    ) -> Self {
        let viewer_role = viewer_role.into();
        let store = Arc::new(Mutex::new(ChannelStateStore::new(viewer_id)));
        let router = Arc::new(MessageRouter::new(
            viewer_id,
            viewer_role.clone(),
            admin_roles,
            ids.clone(),
        ));

        supervisor.set_sink(Arc::new(RouterSink {
            store: store.clone(),
            router,
        }));

        Self {
            store,
            supervisor,
            history,
            ids,
            viewer_id,
            viewer_role,
        }
    }

    fn store(&self) -> MutexGuard<'_, ChannelStateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure against the current state under the store lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&ChannelStateStore) -> R) -> R {
        f(&self.store())
    }

    /// Run a closure that mutates state (banner dismissal and the like).
    pub fn with_store_mut<R>(&self, f: impl FnOnce(&mut ChannelStateStore) -> R) -> R {
        f(&mut self.store())
    }

    fn validated(content: &str) -> Result<&str, StagelinkError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(StagelinkError::Channel {
                message: "message content is empty".into(),
                source: None,
            });
        }
        Ok(trimmed)
    }

    /// Send to the assistant or admin conversation, per the current mode.
    ///
    /// Appends an optimistic local echo, then transmits, then gates further
    /// sends until a reply or error frame restores idle. Gated sends are
    /// rejected, not queued.
    pub fn send_user_message(&self, content: &str) -> Result<(), StagelinkError> {
        let trimmed = Self::validated(content)?;

        let mode = {
            let mut store = self.store();
            let mode = store.mode();
            let channel = match mode {
                Mode::Ai => ChannelId::Ai,
                Mode::Admin => ChannelId::Admin,
                Mode::Team => {
                    return Err(StagelinkError::Channel {
                        message: "user messages require ai or admin mode".into(),
                        source: None,
                    });
                }
            };
            if store.indicators.awaiting_reply() {
                return Err(StagelinkError::Channel {
                    message: "a reply is still pending".into(),
                    source: None,
                });
            }

            store.messages.append(ChatMessage::new(
                self.ids.next_id(),
                channel,
                self.viewer_id,
                self.viewer_role.clone(),
                trimmed,
            ));
            store.indicators.set_awaiting_reply(true);
            mode
        };

        let sent = self.supervisor.send(OutboundFrame::UserMessage {
            content: trimmed.to_string(),
            message_type: mode,
        });
        if let Err(e) = &sent {
            warn!(error = %e, "user message transmit failed, releasing send gate");
            self.store().indicators.set_awaiting_reply(false);
        }
        sent
    }

    /// Broadcast to the whole team. No optimistic echo: the server fan-out
    /// (or a `broadcast_sent` confirmation) is the source of truth.
    pub fn send_broadcast(&self, content: &str) -> Result<(), StagelinkError> {
        let trimmed = Self::validated(content)?;
        self.supervisor.send(OutboundFrame::TeamBroadcast {
            content: trimmed.to_string(),
        })
    }

    /// Private message to one team member. No optimistic echo.
    pub fn send_private(&self, peer_id: u64, content: &str) -> Result<(), StagelinkError> {
        let trimmed = Self::validated(content)?;
        self.supervisor.send(OutboundFrame::TeamPrivate {
            recipient_id: peer_id,
            content: trimmed.to_string(),
        })
    }

    /// Admin broadcast into a specific team's channel.
    pub fn send_admin_broadcast(&self, team_id: u64, content: &str) -> Result<(), StagelinkError> {
        let trimmed = Self::validated(content)?;
        self.supervisor.send(OutboundFrame::AdminTeamBroadcast {
            team_id,
            content: trimmed.to_string(),
        })
    }

    /// Switch the top-level mode and hydrate its history.
    ///
    /// `Ai`/`Admin` replace that mode's list from the history collaborator;
    /// `Team` preserves the live broadcast/private buffers and selects no
    /// sub-target by itself. The server notification is best effort: a
    /// disconnected socket does not block the local switch.
    pub async fn switch_mode(&self, mode: Mode) -> Result<(), StagelinkError> {
        if let Err(e) = self.supervisor.send(OutboundFrame::ModeSwitch { mode }) {
            debug!(error = %e, "mode switch not transmitted");
        }

        match mode {
            Mode::Ai | Mode::Admin => {
                let history = self.history.mode_history(mode).await?;
                let channel = match mode {
                    Mode::Ai => ChannelId::Ai,
                    _ => ChannelId::Admin,
                };
                let mut store = self.store();
                store.set_mode(mode);
                store.messages.replace_channel(channel, history);
            }
            Mode::Team => {
                let mut store = self.store();
                store.set_mode(Mode::Team);
                store.messages.select(Selection::None);
            }
        }
        Ok(())
    }

    /// Change the active conversation target, hydrating the sub-channel
    /// where one applies. Selection and unread reset are atomic under the
    /// store lock.
    pub async fn select(&self, selection: Selection) -> Result<(), StagelinkError> {
        match selection {
            Selection::Broadcast => {
                let history = self.history.broadcast_history().await?;
                let mut store = self.store();
                store.messages.replace_channel(ChannelId::Broadcast, history);
                store.messages.select(selection);
            }
            Selection::Private(peer) => {
                let history = self.history.conversation(peer).await?;
                let mut store = self.store();
                store
                    .messages
                    .replace_channel(ChannelId::Private(peer), history);
                store.messages.select(selection);
            }
            _ => self.store().messages.select(selection),
        }
        Ok(())
    }

    /// Members of the local user's team, from the history collaborator.
    pub async fn team_members(&self) -> Result<Vec<TeamMember>, StagelinkError> {
        self.history.team_members().await
    }
}
