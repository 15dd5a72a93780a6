// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated WebSocket connection lifecycle for the Stagelink SDK.
//!
//! [`SocketSupervisor`] owns the single multiplexed socket connection:
//! dialing with current credentials, heartbeating, reconnecting with the
//! shared backoff policy, refresh-forced reconnects, and forwarding decoded
//! inbound frames to a swappable [`FrameSink`](stagelink_core::FrameSink).

pub mod dialer;
pub mod supervisor;

pub use dialer::TungsteniteDialer;
pub use supervisor::{SocketSupervisor, SocketSupervisorBuilder};
