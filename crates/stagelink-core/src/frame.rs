// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire frames exchanged over the multiplexed socket.
//!
//! Inbound frames are a tagged union keyed by a required `type` string; the
//! payload shape is type-specific, so the remainder of the object is kept as
//! an open JSON map. Outbound frames serialize as `{"type": ..., ...payload}`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StagelinkError;
use crate::types::Mode;

/// A decoded inbound frame: the `type` tag plus the remaining payload fields.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// The `type` tag identifying the message kind.
    pub kind: String,
    /// All payload fields other than `type`.
    pub payload: Map<String, Value>,
}

impl InboundFrame {
    /// Decode a raw text frame.
    ///
    /// A frame that is not a JSON object, or that lacks a string `type`
    /// field, is a protocol error; the caller drops it with a diagnostic
    /// and the connection is unaffected.
    pub fn parse(text: &str) -> Result<Self, StagelinkError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| StagelinkError::protocol(format!("malformed frame JSON: {e}")))?;

        let Value::Object(mut map) = value else {
            return Err(StagelinkError::protocol("frame is not a JSON object"));
        };

        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => {
                return Err(StagelinkError::protocol("frame `type` tag is not a string"));
            }
            None => return Err(StagelinkError::protocol("frame missing `type` tag")),
        };

        Ok(Self { kind, payload: map })
    }

    /// Construct a frame directly from parts (used by tests and mocks).
    pub fn new(kind: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }
}

/// An outbound frame, serialized with its `type` tag inline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Message to the assistant or admin conversation.
    #[serde(rename = "user_message")]
    UserMessage { content: String, message_type: Mode },

    /// Message to the whole team broadcast channel.
    #[serde(rename = "team_broadcast_message")]
    TeamBroadcast { content: String },

    /// Private message to one peer.
    #[serde(rename = "team_private_message")]
    TeamPrivate { recipient_id: u64, content: String },

    /// Admin broadcast to a specific team.
    #[serde(rename = "admin_team_broadcast")]
    AdminTeamBroadcast { team_id: u64, content: String },

    /// Top-level mode switch notification.
    #[serde(rename = "mode_switch")]
    ModeSwitch { mode: Mode },
}

impl OutboundFrame {
    /// Serialize to the wire text representation.
    pub fn to_json(&self) -> Result<String, StagelinkError> {
        serde_json::to_string(self)
            .map_err(|e| StagelinkError::Internal(format!("outbound frame serialization: {e}")))
    }
}
