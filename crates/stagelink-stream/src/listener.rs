// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Listener registry for event streams.
//!
//! Multiple callbacks may be registered per event type; they are invoked in
//! registration order, and one failing callback never blocks the others.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use stagelink_core::StagelinkError;

/// Callback invoked with the decoded payload of one event.
///
/// Returning `Err` is logged per-callback and does not affect other
/// listeners or the connection.
pub type Listener = Box<dyn Fn(&Value) -> Result<(), StagelinkError> + Send + Sync>;

/// Registered callbacks are shared so emitters can snapshot them and run
/// them without holding the registry lock; a callback may therefore call
/// back into `on`/`off` on the stream it was registered with.
pub(crate) type SharedListener = Arc<dyn Fn(&Value) -> Result<(), StagelinkError> + Send + Sync>;

/// Handle for unregistering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered per-event-type listener table.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, SharedListener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `event`; returns the id used by [`off`](Self::off).
    pub fn on(&mut self, event: &str, callback: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::from(callback)));
        id
    }

    /// Unregister one callback. Returns false when the id was not found.
    pub fn off(&mut self, event: &str, id: ListenerId) -> bool {
        match self.listeners.get_mut(event) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|(entry_id, _)| *entry_id != id);
                entries.len() != before
            }
            None => false,
        }
    }

    /// Clone the current callbacks for `event`, in registration order.
    ///
    /// Emitters dispatch the snapshot after releasing whatever lock guards
    /// the registry, so callbacks registered or removed during dispatch take
    /// effect from the next event on.
    pub(crate) fn snapshot(&self, event: &str) -> Vec<(ListenerId, SharedListener)> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    /// Invoke all callbacks for `event` in registration order.
    pub fn emit(&self, event: &str, payload: &Value) {
        dispatch(event, payload, &self.snapshot(event));
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

/// Run a snapshot of callbacks, logging per-callback failures.
pub(crate) fn dispatch(event: &str, payload: &Value, entries: &[(ListenerId, SharedListener)]) {
    for (id, callback) in entries {
        if let Err(e) = callback(payload) {
            warn!(event, listener = ?id, error = %e, "event listener failed");
        }
    }
}
