// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-channel chat for the Stagelink SDK.
//!
//! Three layers, lowest first:
//!
//! - [`store`]: the reconciled chat state the UI observes, split into
//!   capability-sized sub-states.
//! - [`router`]: the fixed inbound `type` → handler table applied against a
//!   partial capability set.
//! - [`client`]: outbound send rules, mode switching, and history hydration
//!   over the supervised socket.

pub mod client;
pub mod router;
pub mod store;

pub use client::ChatClient;
pub use router::{MessageRouter, Mutators};
pub use store::{BannerState, ChannelStateStore, CooldownState, IndicatorState, MessageState};
