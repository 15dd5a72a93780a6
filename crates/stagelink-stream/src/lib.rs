// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnecting Server-Sent-Events client for the Stagelink SDK.
//!
//! [`EventStream`] owns one one-way server-push feed: it reconnects with
//! exponential backoff, rebuilds itself when credentials are renewed on the
//! [`RefreshBus`](stagelink_auth::RefreshBus), decodes event payloads as
//! JSON, and fans them out to registered listeners. [`feeds`] provides
//! constructors for the platform's fixed feed paths.

pub mod feeds;
pub mod listener;
pub mod stream;

pub use listener::{Listener, ListenerId, ListenerRegistry};
pub use stream::{lifecycle, EventStream, EventStreamBuilder};
