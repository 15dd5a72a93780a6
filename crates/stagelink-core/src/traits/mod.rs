// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the Stagelink client and its collaborators.
//!
//! All async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod auth;
pub mod history;
pub mod ids;
pub mod socket;

pub use auth::CredentialSource;
pub use history::HistoryLoader;
pub use ids::{IdSource, UuidIds};
pub use socket::{FrameSink, SocketDialer, SocketLink};
