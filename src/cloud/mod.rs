// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NaviLink cloud REST access: authentication and device discovery.
//!
//! The coordinator only sees the [`CloudApi`] trait, so tests substitute a
//! mock; [`NavienCloud`] is the production implementation backed by
//! [`AuthClient`] and [`ApiClient`].

mod api;
mod auth;

pub use api::{ApiClient, NavienCloud};
pub use auth::{AuthClient, AuthTokens};

use async_trait::async_trait;

use crate::error::{ApiError, AuthError};
use crate::model::Device;

/// Cloud-facing surface the synchronization core depends on.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Establishes a session, signing in if no valid token is held.
    async fn authenticate(&self) -> Result<(), AuthError>;

    /// Ensures the held access token is valid, refreshing if needed.
    async fn ensure_valid_token(&self) -> Result<(), AuthError>;

    /// Returns a valid access token for transport-level authentication.
    async fn access_token(&self) -> Result<String, AuthError>;

    /// Lists the devices registered on the account.
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError>;

    /// Returns the currently held tokens, for callers that persist them.
    async fn current_tokens(&self) -> Option<AuthTokens>;
}
