// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device REST API client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AccountConfig;
use crate::error::{ApiError, AuthError};
use crate::model::Device;

use super::auth::{AuthClient, AuthTokens};
use super::CloudApi;

/// Wire shape of the device list response.
#[derive(Debug, Deserialize)]
struct DeviceListResponse {
    devices: Vec<Device>,
}

/// Client for the authenticated device endpoints.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthClient>,
}

impl ApiClient {
    /// Creates an API client sharing the given auth client.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, auth: Arc<AuthClient>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth,
        }
    }

    /// Fetches the devices registered on the account.
    ///
    /// An empty list is returned as-is; classifying it is left to the
    /// caller, which knows whether "no devices" is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on authentication, network, or payload
    /// failures.
    pub async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        let tokens = self.auth.ensure_valid_token().await?;

        let url = format!("{}/devices", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::UnexpectedResponse(format!(
                "device list returned {status}"
            )));
        }

        let list = response
            .json::<DeviceListResponse>()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))?;

        tracing::debug!(count = list.devices.len(), "fetched device list");
        Ok(list.devices)
    }
}

/// Production [`CloudApi`] implementation for the NaviLink service.
#[derive(Debug)]
pub struct NavienCloud {
    auth: Arc<AuthClient>,
    api: ApiClient,
}

impl NavienCloud {
    /// Builds the cloud clients from account configuration.
    #[must_use]
    pub fn new(config: &AccountConfig) -> Self {
        let http = reqwest::Client::new();
        let auth = Arc::new(AuthClient::new(
            http.clone(),
            config.api_base_url.clone(),
            config.email.clone(),
            config.password.clone(),
            config.stored_tokens.clone(),
        ));
        let api = ApiClient::new(http, config.api_base_url.clone(), Arc::clone(&auth));

        Self { auth, api }
    }
}

#[async_trait]
impl CloudApi for NavienCloud {
    async fn authenticate(&self) -> Result<(), AuthError> {
        self.auth.ensure_valid_token().await.map(|_| ())
    }

    async fn ensure_valid_token(&self) -> Result<(), AuthError> {
        self.auth.ensure_valid_token().await.map(|_| ())
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.auth
            .ensure_valid_token()
            .await
            .map(|tokens| tokens.access_token)
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        self.api.list_devices().await
    }

    async fn current_tokens(&self) -> Option<AuthTokens> {
        self.auth.current_tokens().await
    }
}
