// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-flight credential refresh.
//!
//! When several connections hit an auth failure at once, only one underlying
//! refresh call may be made; every waiter observes that single outcome. The
//! coordinator serializes refreshes behind an async mutex and tracks a
//! generation counter so callers that queued up behind an in-flight refresh
//! reuse its result instead of issuing their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use stagelink_core::{CredentialSource, StagelinkError};

use crate::bus::RefreshBus;

/// Outcome of the most recent completed refresh, shareable across waiters.
#[derive(Debug, Clone)]
enum Outcome {
    Token(String),
    Failed(String),
}

struct Flight {
    generation: u64,
    last: Option<Outcome>,
}

/// Shares one in-flight refresh across concurrent callers.
///
/// On success the [`RefreshBus`] is notified so live connections rebuild
/// themselves with fresh credentials. If the refresh itself fails, the
/// failure is surfaced unchanged to the caller that ran it and as an auth
/// error to every waiter; no notification is published.
pub struct RefreshCoordinator {
    source: Arc<dyn CredentialSource>,
    bus: RefreshBus,
    generation: AtomicU64,
    flight: Mutex<Flight>,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn CredentialSource>, bus: RefreshBus) -> Self {
        Self {
            source,
            bus,
            generation: AtomicU64::new(0),
            flight: Mutex::new(Flight {
                generation: 0,
                last: None,
            }),
        }
    }

    /// The bus notified after each successful refresh.
    pub fn bus(&self) -> &RefreshBus {
        &self.bus
    }

    /// The currently valid token, without forcing a refresh.
    pub async fn current(&self) -> Result<String, StagelinkError> {
        self.source.current().await
    }

    /// Refresh credentials, sharing one underlying call across concurrent
    /// callers.
    pub async fn refresh(&self) -> Result<String, StagelinkError> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut flight = self.flight.lock().await;

        // A refresh completed while this caller waited for the lock; share
        // its outcome instead of issuing another call.
        if flight.generation > observed {
            debug!("joining completed refresh outcome");
            return match flight.last.as_ref() {
                Some(Outcome::Token(token)) => Ok(token.clone()),
                Some(Outcome::Failed(message)) => Err(StagelinkError::Auth {
                    message: message.clone(),
                    source: None,
                }),
                None => Err(StagelinkError::Internal(
                    "refresh generation advanced without an outcome".into(),
                )),
            };
        }

        let result = self.source.refresh().await;
        flight.generation += 1;
        self.generation.store(flight.generation, Ordering::Release);

        match &result {
            Ok(token) => {
                flight.last = Some(Outcome::Token(token.clone()));
                debug!("credentials refreshed, notifying subscribers");
                self.bus.notify();
            }
            Err(e) => {
                flight.last = Some(Outcome::Failed(e.to_string()));
                warn!(error = %e, "credential refresh failed");
            }
        }

        result
    }
}
