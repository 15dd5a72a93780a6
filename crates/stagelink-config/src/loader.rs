// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./stagelink.toml` > `~/.config/stagelink/stagelink.toml`
//! > `/etc/stagelink/stagelink.toml` with environment variable overrides via
//! the `STAGELINK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use tracing::debug;

use crate::model::StagelinkConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/stagelink/stagelink.toml` (system-wide)
/// 3. `~/.config/stagelink/stagelink.toml` (user XDG config)
/// 4. `./stagelink.toml` (local directory)
/// 5. `STAGELINK_*` environment variables
pub fn load_config() -> Result<StagelinkConfig, figment::Error> {
    debug!("loading configuration from XDG hierarchy and STAGELINK_ env overrides");
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<StagelinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StagelinkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<StagelinkConfig, figment::Error> {
    debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(StagelinkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(StagelinkConfig::default()))
        .merge(Toml::file("/etc/stagelink/stagelink.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("stagelink/stagelink.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("stagelink.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `STAGELINK_CONNECTION_SOCKET_URL` must
/// map to `connection.socket_url`, not `connection.socket.url`.
fn env_provider() -> Env {
    Env::prefixed("STAGELINK_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: STAGELINK_CONNECTION_SOCKET_URL -> "connection_socket_url"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("connection_", "connection.", 1)
            .replacen("reconnect_", "reconnect.", 1)
            .replacen("roles_", "roles.", 1)
            .replacen("client_", "client.", 1);
        mapped.into()
    })
}
