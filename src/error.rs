// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `NavLink` library.
//!
//! This module provides the error hierarchy for failures across the library:
//! cloud authentication, the device REST API, the MQTT push transport, and
//! payload parsing.

use thiserror::Error;

/// The main error type for this library.
///
/// This enum encompasses all possible errors that can occur while
/// synchronizing with the NaviLink cloud service.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during cloud authentication.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Error occurred while talking to the device REST API.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Error occurred on the push transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A control command could not be constructed.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Device is not known to the coordinator.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The push session is not connected.
    #[error("push session is not connected")]
    NotConnected,
}

/// Errors related to cloud authentication and token handling.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The account credentials were rejected.
    ///
    /// This is not retriable; the caller must obtain new credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Refreshing the access token failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// A network-level failure during sign-in or refresh.
    ///
    /// Retriable; the next setup attempt may succeed.
    #[error("network error during authentication: {0}")]
    Network(#[from] reqwest::Error),

    /// The service returned a response the client could not interpret.
    #[error("unexpected authentication response: {0}")]
    UnexpectedResponse(String),
}

impl AuthError {
    /// Returns `true` if the failure is transient and the whole setup
    /// should simply be retried later.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RefreshFailed(_))
    }
}

/// Errors related to the device REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The account has no registered devices.
    ///
    /// Distinct from a network failure so the caller can tell the user to
    /// check their device registration rather than their connection.
    #[error("no devices registered for this account")]
    NoDevices,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed while obtaining API access.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The service returned a response the client could not interpret.
    #[error("unexpected API response: {0}")]
    UnexpectedResponse(String),
}

/// Errors related to the MQTT push transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// MQTT client request failed.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection handshake failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The operation was cancelled because the session is reconnecting
    /// with a clean session.
    ///
    /// The transport keeps the request queued and resubmits it once the
    /// session is re-established, so callers treat this as accepted
    /// rather than failed.
    #[error("operation queued: session is reconnecting")]
    CancelledForCleanSession,

    /// Invalid broker URL or address.
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// No session exists for the requested operation.
    #[error("transport is not connected")]
    NotConnected,
}

impl TransportError {
    /// Returns `true` if the underlying session will retry the operation
    /// on its own once reconnected.
    #[must_use]
    pub fn is_queued_for_retry(&self) -> bool {
        matches!(self, Self::CancelledForCleanSession)
    }
}

/// Errors related to parsing cloud and device payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field in payload: {0}")]
    MissingField(String),

    /// Unexpected payload format.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),
}

/// Errors related to constructing control commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command name is not part of the supported command set.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required parameter was not supplied.
    #[error("command {command} is missing parameter {parameter}")]
    MissingParameter {
        /// The command being constructed.
        command: String,
        /// The parameter that was absent.
        parameter: String,
    },

    /// A parameter value could not be interpreted.
    #[error("invalid value for {parameter}: {message}")]
    InvalidParameter {
        /// The offending parameter.
        parameter: String,
        /// Description of the problem.
        message: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
