// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as positive delays and plausible endpoint URLs.

use crate::diagnostic::ConfigError;
use crate::model::StagelinkConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &StagelinkConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.reconnect.max_attempts < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.max_attempts must be at least 1, got {}",
                config.reconnect.max_attempts
            ),
        });
    }

    if config.reconnect.base_delay_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "reconnect.base_delay_ms must be greater than 0".to_string(),
        });
    }

    if config.reconnect.max_delay_ms < config.reconnect.base_delay_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.max_delay_ms ({}) must be >= reconnect.base_delay_ms ({})",
                config.reconnect.max_delay_ms, config.reconnect.base_delay_ms
            ),
        });
    }

    if config.connection.heartbeat_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "connection.heartbeat_secs must be greater than 0".to_string(),
        });
    }

    if let Some(url) = &config.connection.socket_url {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            errors.push(ConfigError::Validation {
                message: format!(
                    "connection.socket_url `{url}` must start with ws:// or wss://"
                ),
            });
        }
    }

    if let Some(url) = &config.connection.sse_base_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ConfigError::Validation {
                message: format!(
                    "connection.sse_base_url `{url}` must start with http:// or https://"
                ),
            });
        }
    }

    if config.roles.admin_roles.is_empty() {
        errors.push(ConfigError::Validation {
            message: "roles.admin_roles must not be empty".to_string(),
        });
    }

    for role in &config.roles.admin_roles {
        if role.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "roles.admin_roles entries must not be blank".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
