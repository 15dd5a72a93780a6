// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Controllable credential source.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use stagelink_core::{CredentialSource, StagelinkError};

/// A [`CredentialSource`] with a fixed token and scripted refresh behavior.
pub struct StaticCredentials {
    token: Mutex<String>,
    refreshed_token: Option<String>,
    refresh_calls: AtomicU32,
}

impl StaticCredentials {
    /// Refreshing yields `token-refreshed-<n>`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(token.into()),
            refreshed_token: None,
            refresh_calls: AtomicU32::new(0),
        }
    }

    /// Refreshing always yields `refreshed`.
    pub fn with_refresh(token: impl Into<String>, refreshed: impl Into<String>) -> Self {
        Self {
            refreshed_token: Some(refreshed.into()),
            ..Self::new(token)
        }
    }

    /// Refreshing always fails.
    pub fn failing_refresh(token: impl Into<String>) -> Self {
        Self {
            refreshed_token: Some(String::new()),
            ..Self::new(token)
        }
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn token(&self) -> MutexGuard<'_, String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn current(&self) -> Result<String, StagelinkError> {
        Ok(self.token().clone())
    }

    async fn refresh(&self) -> Result<String, StagelinkError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = match &self.refreshed_token {
            Some(t) if t.is_empty() => {
                return Err(StagelinkError::Auth {
                    message: "scripted refresh failure".into(),
                    source: None,
                });
            }
            Some(t) => t.clone(),
            None => format!("token-refreshed-{n}"),
        };
        *self.token() = next.clone();
        Ok(next)
    }
}
