// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Socket transport seams for the connection supervisor.
//!
//! The supervisor never touches a concrete WebSocket library directly; it
//! dials through [`SocketDialer`] and talks to the resulting [`SocketLink`],
//! so tests can substitute a scripted link.

use async_trait::async_trait;

use crate::error::StagelinkError;
use crate::frame::InboundFrame;

/// One live, bidirectional text-frame connection.
#[async_trait]
pub trait SocketLink: Send {
    /// Send a text frame. A failed write counts as an abrupt close.
    async fn send_text(&mut self, text: String) -> Result<(), StagelinkError>;

    /// Receive the next text frame.
    ///
    /// `None` signals a clean close; `Some(Err(_))` an abrupt one. Non-text
    /// frames are handled inside the link and never surface here.
    async fn next_text(&mut self) -> Option<Result<String, StagelinkError>>;

    /// Send a keepalive ping.
    async fn ping(&mut self) -> Result<(), StagelinkError>;

    /// Close the connection. Errors during close are ignored.
    async fn close(&mut self);
}

impl std::fmt::Debug for dyn SocketLink + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn SocketLink")
    }
}

/// Opens authenticated socket connections.
#[async_trait]
pub trait SocketDialer: Send + Sync {
    /// Dial `url` carrying `token` as the credential.
    ///
    /// A rejection caused by expired credentials must surface as
    /// [`StagelinkError::Auth`] so the supervisor can run the shared
    /// refresh-and-retry flow.
    async fn dial(&self, url: &str, token: &str) -> Result<Box<dyn SocketLink>, StagelinkError>;
}

/// Receives decoded inbound frames from the supervisor's read loop.
///
/// The supervisor holds the current sink in a swappable slot: the underlying
/// subscription is created once per connection lifetime while always
/// dispatching to the sink installed at delivery time.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: InboundFrame);
}
