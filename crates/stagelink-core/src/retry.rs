// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared reconnect policy and exponential backoff.
//!
//! Both the SSE event stream and the WebSocket supervisor reconnect the same
//! way: `delay(n) = min(base * 2^(n-1), max)` for the n-th consecutive
//! failure, with the counter reset on a successful open and a hard stop
//! after `max_attempts` consecutive failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnection policy for a single push/pull connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Consecutive failure ceiling before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound on any scheduled delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Mutable backoff state for one connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Consecutive failures recorded since the last successful open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a successful open: the next failure restarts at the base delay.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Record a failure and return the delay before the next attempt, or
    /// `None` once `max_attempts` consecutive failures have occurred.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.policy.max_attempts {
            return None;
        }
        // Cap the exponent so the shift cannot overflow before min() applies.
        let exp = (self.failures - 1).min(31);
        let delay = self
            .policy
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.policy.max_delay);
        Some(delay)
    }
}
