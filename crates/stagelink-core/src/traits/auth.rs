// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential source seam.
//!
//! Token acquisition itself is out of scope; the client only needs the
//! current token for dialing and a way to force a renewal when a request is
//! rejected. The single-flight wrapper around `refresh()` lives in
//! `stagelink-auth`.

use async_trait::async_trait;

use crate::error::StagelinkError;

/// Supplies authentication tokens for socket and stream connections.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The currently valid token, if any.
    async fn current(&self) -> Result<String, StagelinkError>;

    /// Obtain a fresh token, invalidating the previous one.
    async fn refresh(&self) -> Result<String, StagelinkError>;
}
