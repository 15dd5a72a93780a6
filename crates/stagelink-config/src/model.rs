// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Stagelink client SDK.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagelink_core::ReconnectPolicy;

/// Top-level Stagelink configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StagelinkConfig {
    /// Socket and SSE endpoint settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Reconnection/backoff policy shared by the socket and SSE streams.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Role classification settings.
    #[serde(default)]
    pub roles: RolesConfig,

    /// Client behavior settings.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Socket and SSE endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// WebSocket endpoint URL. `None` disables the chat socket.
    #[serde(default)]
    pub socket_url: Option<String>,

    /// Base URL for SSE feed endpoints. `None` disables SSE feeds.
    #[serde(default)]
    pub sse_base_url: Option<String>,

    /// Interval between keepalive pings on the socket, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_url: None,
            sse_base_url: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    30
}

/// Reconnection policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Consecutive failure ceiling before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any scheduled delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Convert to the runtime policy used by the connection layers.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Role classification configuration.
///
/// Which sender roles count as administrators (and therefore have their
/// broadcasts redirected to the admin-notifications feed for non-admin
/// viewers) is deployment-specific, so it is configuration rather than a
/// hard-coded enumeration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    /// Sender roles treated as administrators.
    #[serde(default = "default_admin_roles")]
    pub admin_roles: Vec<String>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            admin_roles: default_admin_roles(),
        }
    }
}

fn default_admin_roles() -> Vec<String> {
    vec!["admin".to_string(), "organizer".to_string()]
}

/// Client behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = StagelinkConfig::default();
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.connection.heartbeat_secs, 30);
        assert_eq!(config.roles.admin_roles, vec!["admin", "organizer"]);
        assert_eq!(config.client.log_level, "info");
    }

    #[test]
    fn reconnect_config_converts_to_policy() {
        let config = ReconnectConfig {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        };
        let policy = config.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_millis(8000));
    }
}
