// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Stagelink client SDK.
//!
//! This crate provides the error type, wire frame model, shared reconnect
//! policy, and the trait seams (socket transport, credentials, history,
//! id generation) used throughout the Stagelink workspace.

pub mod error;
pub mod frame;
pub mod retry;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::StagelinkError;
pub use frame::{InboundFrame, OutboundFrame};
pub use retry::{Backoff, ReconnectPolicy};
pub use types::{ChannelId, ChatMessage, ConnectionStatus, MessageMeta, Mode, Selection, TeamMember};

pub use traits::{CredentialSource, FrameSink, HistoryLoader, IdSource, SocketDialer, SocketLink, UuidIds};
