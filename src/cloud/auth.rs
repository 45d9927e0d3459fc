// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authentication against the NaviLink account service.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AuthError;

/// Safety margin subtracted from the token lifetime, so a token is
/// refreshed before it actually lapses mid-request.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access and refresh tokens for one account session.
///
/// Serializable so consumers can persist tokens across restarts and hand
/// them back via
/// [`AccountConfig::with_stored_tokens`](crate::config::AccountConfig::with_stored_tokens),
/// skipping the initial sign-in round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Bearer token for API and transport authentication.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
    /// Instant the access token lapses.
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Returns `true` if the access token is expired or about to expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// Wire shape of a successful sign-in or refresh response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Lifetime of the access token in seconds.
    expires_in: i64,
}

impl TokenResponse {
    fn into_tokens(self) -> AuthTokens {
        AuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(self.expires_in),
        }
    }
}

/// Client for the account sign-in and token refresh endpoints.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    tokens: RwLock<Option<AuthTokens>>,
}

impl AuthClient {
    /// Creates an authentication client.
    ///
    /// If `stored_tokens` are supplied and still valid, the initial
    /// sign-in round-trip is skipped.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        stored_tokens: Option<AuthTokens>,
    ) -> Self {
        let restored = stored_tokens.filter(|tokens| {
            if tokens.is_expired() {
                tracing::info!("stored tokens expired, will re-authenticate");
                false
            } else {
                tracing::info!(expires_at = %tokens.expires_at, "restored stored tokens");
                true
            }
        });

        Self {
            http,
            base_url: base_url.into(),
            email: email.into(),
            password: password.into(),
            tokens: RwLock::new(restored),
        }
    }

    /// Signs in with the account credentials, replacing any held tokens.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] on a credential rejection,
    /// [`AuthError::Network`] on connection problems.
    pub async fn sign_in(&self) -> Result<AuthTokens, AuthError> {
        let url = format!("{}/auth/sign-in", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "email": self.email,
                "password": self.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::UnexpectedResponse(format!(
                "sign-in returned {status}"
            )));
        }

        let tokens = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?
            .into_tokens();

        tracing::debug!(expires_at = %tokens.expires_at, "signed in");
        *self.tokens.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    /// Exchanges the refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let url = format!("{}/auth/refresh", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::RefreshFailed(format!(
                "refresh returned {status}"
            )));
        }

        let tokens = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?
            .into_tokens();

        tracing::debug!(expires_at = %tokens.expires_at, "refreshed access token");
        *self.tokens.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    /// Returns valid tokens, refreshing or re-signing-in as needed.
    ///
    /// A failed refresh falls back to a full sign-in; only a credential
    /// rejection or network failure surfaces to the caller.
    ///
    /// # Errors
    ///
    /// See [`sign_in`](Self::sign_in).
    pub async fn ensure_valid_token(&self) -> Result<AuthTokens, AuthError> {
        let held = self.tokens.read().await.clone();

        match held {
            Some(tokens) if !tokens.is_expired() => Ok(tokens),
            Some(tokens) => match self.refresh(&tokens.refresh_token).await {
                Ok(fresh) => Ok(fresh),
                Err(err @ AuthError::Network(_)) => Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "token refresh failed, signing in again");
                    self.sign_in().await
                }
            },
            None => self.sign_in().await,
        }
    }

    /// Returns the currently held tokens, if any.
    pub async fn current_tokens(&self) -> Option<AuthTokens> {
        self.tokens.read().await.clone()
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}
