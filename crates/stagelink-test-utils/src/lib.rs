// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared mock adapters for Stagelink crate tests.
//!
//! These implement the trait seams from `stagelink-core` with scripted,
//! inspectable behavior: a socket whose inbound frames the test feeds by
//! hand, a credential source with controllable refresh outcomes, a canned
//! history loader, and a deterministic id source.

pub mod credentials;
pub mod history;
pub mod ids;
pub mod socket;

pub use credentials::StaticCredentials;
pub use history::MockHistory;
pub use ids::SequentialIds;
pub use socket::{LinkHandle, MockDialer, MockLink};
