// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential-refresh coordination for the Stagelink client SDK.
//!
//! Token acquisition itself lives outside this workspace (behind the
//! [`CredentialSource`](stagelink_core::CredentialSource) seam); this crate
//! provides the pieces the connection layers depend on:
//!
//! - [`RefreshBus`]: a payload-free broadcast announcing credential renewals
//!   so live connections can rebuild themselves.
//! - [`RefreshCoordinator`]: single-flight refresh shared across concurrent
//!   callers hitting an auth failure simultaneously.

pub mod bus;
pub mod coordinator;

pub use bus::{await_refresh, drain_refresh, RefreshBus};
pub use coordinator::RefreshCoordinator;
