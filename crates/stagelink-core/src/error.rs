// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Stagelink client SDK.

use thiserror::Error;

/// The primary error type used across all Stagelink crates.
///
/// The variants follow the client error taxonomy: transport errors are
/// retried by the connection layers, protocol errors are per-message and
/// non-fatal, auth errors go through the shared refresh flow, and config
/// errors fail fast at construction.
#[derive(Debug, Error)]
pub enum StagelinkError {
    /// Configuration errors (missing endpoint, invalid TOML, bad values).
    /// Fatal at construction time; never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport errors (connection refused, dropped, TLS failure).
    /// Retried with exponential backoff up to the configured ceiling.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Protocol errors (malformed JSON, frame missing its `type` tag).
    /// Logged and skipped per-message; never terminates a connection.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Authentication errors (credentials expired or rejected).
    /// Trigger the shared refresh-and-retry flow.
    #[error("auth error: {message}")]
    Auth {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Channel-level errors (send on a closed socket, sink gone).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reconnect attempts exhausted; carries the consecutive failure count.
    #[error("connection failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StagelinkError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        StagelinkError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a per-message protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        StagelinkError::Protocol {
            message: message.into(),
        }
    }

    /// True for errors the connection layers retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StagelinkError::Transport { .. } | StagelinkError::Timeout { .. })
    }
}
