// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push transport abstraction.
//!
//! The synchronization core treats the transport purely as an event source
//! plus a request sink: it subscribes per device, fires requests and
//! commands, and reacts to named connection events. [`MqttTransport`] is
//! the production implementation; tests substitute the trait.

mod listeners;
mod mqtt;

pub use listeners::{EventListeners, ListenerId};
pub use mqtt::{MqttTransport, MqttTransportFactory};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ControlCommand;
use crate::error::TransportError;
use crate::model::{Device, DeviceFeature, DeviceStatus};
use crate::types::MacAddress;

/// An event emitted by the push transport.
///
/// Status and feature updates arrive on the transport's own execution
/// context; everything that touches shared state must go through the
/// [`EventBridge`](crate::bridge::EventBridge) first.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A fresh telemetry snapshot arrived for a device.
    StatusUpdate {
        /// Reporting device.
        mac: MacAddress,
        /// The new snapshot.
        status: DeviceStatus,
    },
    /// A fresh capability snapshot arrived for a device.
    FeatureUpdate {
        /// Reporting device.
        mac: MacAddress,
        /// The new snapshot.
        feature: DeviceFeature,
    },
    /// The session dropped and is not currently usable.
    ConnectionLost {
        /// Human-readable cause.
        reason: String,
    },
    /// The session recovered after a loss.
    ConnectionRestored,
    /// The session's own reconnection attempts are failing.
    ReconnectionFailed {
        /// Attempts made so far.
        attempts: u32,
    },
    /// Low-level interruption notice (diagnostics only).
    Interrupted {
        /// Human-readable cause.
        reason: String,
    },
    /// Low-level resume notice (diagnostics only).
    Resumed {
        /// Whether the broker kept the previous session.
        session_present: bool,
    },
}

/// Event kind discriminant, used for listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    /// See [`TransportEvent::StatusUpdate`].
    StatusUpdate,
    /// See [`TransportEvent::FeatureUpdate`].
    FeatureUpdate,
    /// See [`TransportEvent::ConnectionLost`].
    ConnectionLost,
    /// See [`TransportEvent::ConnectionRestored`].
    ConnectionRestored,
    /// See [`TransportEvent::ReconnectionFailed`].
    ReconnectionFailed,
    /// See [`TransportEvent::Interrupted`].
    Interrupted,
    /// See [`TransportEvent::Resumed`].
    Resumed,
}

impl TransportEvent {
    /// Returns the kind discriminant for this event.
    #[must_use]
    pub fn kind(&self) -> TransportEventKind {
        match self {
            Self::StatusUpdate { .. } => TransportEventKind::StatusUpdate,
            Self::FeatureUpdate { .. } => TransportEventKind::FeatureUpdate,
            Self::ConnectionLost { .. } => TransportEventKind::ConnectionLost,
            Self::ConnectionRestored => TransportEventKind::ConnectionRestored,
            Self::ReconnectionFailed { .. } => TransportEventKind::ReconnectionFailed,
            Self::Interrupted { .. } => TransportEventKind::Interrupted,
            Self::Resumed { .. } => TransportEventKind::Resumed,
        }
    }
}

/// A push-messaging session to the cloud.
///
/// Implementations own all timing: periodic request timers, reconnection
/// backoff, and request timeouts live below this trait. The core never
/// imposes its own deadline on these calls.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Performs the connection handshake.
    ///
    /// Returns `Ok(false)` when the broker refused the session without a
    /// transport-level error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on handshake failures.
    async fn connect(&self) -> Result<bool, TransportError>;

    /// Closes the session. Safe to call when already disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if teardown hit an error; the session is
    /// dropped regardless.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Returns `true` while the session is usable.
    fn is_connected(&self) -> bool;

    /// Returns the listener registry for this session's events.
    fn listeners(&self) -> &EventListeners;

    /// Registers push-update delivery for one device.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the subscription could not be placed.
    async fn subscribe_device(&self, device: &Device) -> Result<(), TransportError>;

    /// Starts a periodic status request timer for one device.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no session exists.
    async fn start_periodic_status_requests(
        &self,
        device: &Device,
        interval: Duration,
    ) -> Result<(), TransportError>;

    /// Starts a periodic device info request timer for one device.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no session exists.
    async fn start_periodic_info_requests(
        &self,
        device: &Device,
        interval: Duration,
    ) -> Result<(), TransportError>;

    /// Stops every periodic timer owned by this session.
    async fn stop_all_periodic_tasks(&self);

    /// Fires a one-shot status request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`]; [`TransportError::CancelledForCleanSession`]
    /// means the request is queued, not lost.
    async fn request_status(&self, device: &Device) -> Result<(), TransportError>;

    /// Fires a one-shot device info request.
    ///
    /// # Errors
    ///
    /// See [`request_status`](Self::request_status).
    async fn request_info(&self, device: &Device) -> Result<(), TransportError>;

    /// Publishes a control command.
    ///
    /// # Errors
    ///
    /// See [`request_status`](Self::request_status).
    async fn publish_command(
        &self,
        device: &Device,
        command: &ControlCommand,
    ) -> Result<(), TransportError>;

    /// Resets the session's internal reconnection backoff.
    async fn reset_reconnect(&self);
}

/// Creates fresh transport sessions.
///
/// The connection manager tears a session down completely before building
/// its successor, so the factory must return a brand-new session every
/// call, never a cached one.
pub trait TransportFactory: Send + Sync {
    /// Creates a new, not-yet-connected session.
    fn create(&self) -> Arc<dyn PushTransport>;
}
