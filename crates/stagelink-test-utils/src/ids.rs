// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic id source.

use std::sync::atomic::{AtomicU64, Ordering};

use stagelink_core::IdSource;

/// Yields `local-1`, `local-2`, ... so tests can assert exact ids.
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("local-{n}")
    }
}
