// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Injected message-id generation.
//!
//! The store owns an [`IdSource`] instance instead of a module-level
//! counter, keeping id generation isolated per client and deterministic in
//! tests.

/// Generates unique client-side message ids.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default id source backed by random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
