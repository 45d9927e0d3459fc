// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle management for the push-messaging session.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::bridge::EventBridge;
use crate::cloud::CloudApi;
use crate::command::ControlCommand;
use crate::config::AccountConfig;
use crate::error::TransportError;
use crate::model::Device;
use crate::transport::{
    ListenerId, PushTransport, TransportEvent, TransportEventKind, TransportFactory,
};
use crate::types::Outcome;

/// Bound on the retained connection interruption history.
const MAX_INTERRUPTION_HISTORY: usize = 20;

/// Connection state of the push session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session exists.
    NotConnected,
    /// A session exists but its handshake has not completed, or the
    /// session dropped and its own recovery is pending.
    Connecting,
    /// The session is usable.
    Connected,
    /// A forced reconnect is tearing down and rebuilding the session.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if the session is usable.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// One recorded connection interruption, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptionEvent {
    /// When the interruption was observed.
    pub timestamp: DateTime<Utc>,
    /// Transport-reported cause.
    pub reason: String,
}

/// Snapshot of the manager's connection state.
#[derive(Debug, Clone)]
pub struct ConnectionDiagnostics {
    /// Current connection state.
    pub state: ConnectionState,
    /// Whether a session is currently usable.
    pub is_connected: bool,
    /// When the current session connected, if it is up.
    pub connected_since: Option<DateTime<Utc>>,
    /// Consecutive failed status requests (observational only).
    pub consecutive_timeouts: u32,
    /// Whether a forced reconnect is in flight.
    pub reconnection_in_progress: bool,
    /// Recent connection interruptions, oldest first.
    pub interruptions: Vec<InterruptionEvent>,
}

/// Owns the lifecycle of exactly one push session.
///
/// The manager creates sessions through an injected factory, registers the
/// named event listeners on each new session, and tears the old session
/// down completely before building its successor, so two sessions are
/// never alive at once. Steady-state operational failures are logged and
/// returned as outcomes, never raised.
pub struct ConnectionManager {
    cloud: Arc<dyn CloudApi>,
    factory: Arc<dyn TransportFactory>,
    bridge: EventBridge,
    status_request_interval: Duration,
    info_request_interval: Duration,
    reconnect_cooldown: Duration,
    transport: RwLock<Option<Arc<dyn PushTransport>>>,
    listener_ids: parking_lot::Mutex<Vec<ListenerId>>,
    connected_since: Arc<parking_lot::Mutex<Option<DateTime<Utc>>>>,
    consecutive_timeouts: AtomicU32,
    reconnection_in_progress: AtomicBool,
    interruptions: Arc<parking_lot::Mutex<VecDeque<InterruptionEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager with no active session.
    #[must_use]
    pub fn new(
        cloud: Arc<dyn CloudApi>,
        factory: Arc<dyn TransportFactory>,
        bridge: EventBridge,
        config: &AccountConfig,
    ) -> Self {
        Self {
            cloud,
            factory,
            bridge,
            status_request_interval: config.status_request_interval,
            info_request_interval: config.info_request_interval,
            reconnect_cooldown: config.reconnect_cooldown,
            transport: RwLock::new(None),
            listener_ids: parking_lot::Mutex::new(Vec::new()),
            connected_since: Arc::new(parking_lot::Mutex::new(None)),
            consecutive_timeouts: AtomicU32::new(0),
            reconnection_in_progress: AtomicBool::new(false),
            interruptions: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
        }
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Builds and connects a fresh session.
    ///
    /// Any existing session is fully torn down first, so calling `setup`
    /// twice never leaves duplicate subscriptions or timers behind.
    /// Returns `false` on failure; setup never raises.
    pub async fn setup(&self) -> bool {
        if self.transport.read().await.is_some() {
            self.disconnect().await;
        }

        let transport = self.factory.create();
        self.register_listeners(&transport);
        *self.transport.write().await = Some(transport);

        self.connect().await
    }

    /// Performs the session handshake, refreshing auth tokens first.
    ///
    /// Records `connected_since` on success. Timeout behavior is entirely
    /// the transport's own; no additional deadline is imposed here.
    pub async fn connect(&self) -> bool {
        let Some(transport) = self.current_transport().await else {
            return false;
        };

        // Tokens may have lapsed while the session was down; a stale token
        // would make the broker reject the handshake.
        if let Err(e) = self.cloud.ensure_valid_token().await {
            tracing::error!(error = %e, "failed to ensure valid auth tokens");
            return false;
        }

        match transport.connect().await {
            Ok(true) => {
                let now = Utc::now();
                *self.connected_since.lock() = Some(now);
                tracing::info!(connected_at = %now, "push session connected");
                true
            }
            Ok(false) => {
                tracing::warn!("push session connection refused");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "push session connection failed");
                false
            }
        }
    }

    /// Tears the session down. Idempotent.
    ///
    /// Listeners are unregistered before the transport closes so no
    /// callback can be delivered into a dead session. Teardown errors are
    /// logged, never propagated, and `connected_since` is always cleared.
    pub async fn disconnect(&self) {
        let transport = self.transport.write().await.take();

        if let Some(transport) = transport {
            for id in self.listener_ids.lock().drain(..) {
                transport.listeners().off(id);
            }

            transport.stop_all_periodic_tasks().await;
            if let Err(e) = transport.disconnect().await {
                tracing::debug!(error = %e, "error disconnecting push session");
            }
        }

        *self.connected_since.lock() = None;
    }

    /// Returns `true` while the session is usable.
    pub async fn is_connected(&self) -> bool {
        self.current_transport()
            .await
            .is_some_and(|transport| transport.is_connected())
    }

    /// Returns the current connection state.
    ///
    /// Derived from manager-owned state, so transitions happen exactly
    /// where the manager mutates that state: a forced reconnect reports
    /// `Reconnecting`, a live session `Connected`, a session that exists
    /// but is not (or no longer) usable `Connecting`, and no session at
    /// all `NotConnected`.
    pub async fn connection_state(&self) -> ConnectionState {
        if self.reconnection_in_progress.load(Ordering::SeqCst) {
            return ConnectionState::Reconnecting;
        }
        match self.current_transport().await {
            Some(transport) if transport.is_connected() => ConnectionState::Connected,
            Some(_) => ConnectionState::Connecting,
            None => ConnectionState::NotConnected,
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Registers push delivery for one device.
    ///
    /// Each subscription is independent: a failure here affects neither
    /// other devices' subscriptions nor their updates.
    pub async fn subscribe_device(&self, device: &Device) -> bool {
        let Some(transport) = self.current_transport().await else {
            return false;
        };

        match transport.subscribe_device(device).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    mac = %device.mac_address,
                    error = %e,
                    "failed to subscribe to device"
                );
                false
            }
        }
    }

    /// Starts the transport-owned periodic timers for one device and
    /// fires one immediate info request.
    pub async fn start_periodic_requests(&self, device: &Device) {
        let Some(transport) = self.current_transport().await else {
            return;
        };

        if let Err(e) = transport
            .start_periodic_status_requests(device, self.status_request_interval)
            .await
        {
            tracing::warn!(
                mac = %device.mac_address,
                error = %e,
                "failed to start periodic status requests"
            );
            return;
        }
        if let Err(e) = transport
            .start_periodic_info_requests(device, self.info_request_interval)
            .await
        {
            tracing::warn!(
                mac = %device.mac_address,
                error = %e,
                "failed to start periodic info requests"
            );
            return;
        }

        if let Err(e) = transport.request_info(device).await {
            tracing::warn!(error = %e, "failed immediate info request");
        }
    }

    /// Fires a one-shot status request.
    ///
    /// Success resets the consecutive-timeout counter; failure increments
    /// it. The counter is surfaced via [`diagnostics`](Self::diagnostics)
    /// and never triggers a reconnect by itself.
    pub async fn request_status(&self, device: &Device) -> bool {
        let Some(transport) = self.current_transport().await else {
            return false;
        };

        match transport.request_status(device).await {
            Ok(()) => {
                self.consecutive_timeouts.store(0, Ordering::SeqCst);
                true
            }
            Err(e) => {
                self.consecutive_timeouts.fetch_add(1, Ordering::SeqCst);
                self.classify(&e, "status request").is_success()
            }
        }
    }

    /// Fires a one-shot device info request.
    pub async fn request_device_info(&self, device: &Device) -> bool {
        let Some(transport) = self.current_transport().await else {
            return false;
        };

        match transport.request_info(device).await {
            Ok(()) => true,
            Err(e) => self.classify(&e, "device info request").is_success(),
        }
    }

    /// Dispatches a control command, then requests fresh status.
    ///
    /// The follow-up request is classified separately; its failure does
    /// not demote a successfully dispatched command.
    pub async fn send_command(&self, device: &Device, command: &ControlCommand) -> Outcome {
        let Some(transport) = self.current_transport().await else {
            return Outcome::Failed;
        };

        if let Err(e) = transport.publish_command(device, command).await {
            return self.classify(&e, &format!("command {}", command.name()));
        }

        if let Err(e) = transport.request_status(device).await {
            let _ = self.classify(&e, "post-command status request");
        }

        Outcome::Sent
    }

    /// Tears down, waits out a cool-down, and rebuilds the session,
    /// re-subscribing every given device.
    ///
    /// Guarded by a check-and-set flag: a second call while one is in
    /// flight returns `false` immediately and performs no teardown.
    pub async fn force_reconnect(&self, devices: &[Device]) -> bool {
        if self
            .reconnection_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("reconnection already in progress, skipping");
            return false;
        }

        tracing::warn!("forcing push session reconnection");

        self.disconnect().await;
        tokio::time::sleep(self.reconnect_cooldown).await;

        let result = if self.setup().await {
            tracing::info!("reconnection successful");
            self.consecutive_timeouts.store(0, Ordering::SeqCst);

            for device in devices {
                self.subscribe_device(device).await;
            }
            true
        } else {
            false
        };

        self.reconnection_in_progress.store(false, Ordering::SeqCst);
        result
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Returns a snapshot of the connection state.
    pub async fn diagnostics(&self) -> ConnectionDiagnostics {
        let state = self.connection_state().await;
        ConnectionDiagnostics {
            state,
            is_connected: state.is_connected(),
            connected_since: *self.connected_since.lock(),
            consecutive_timeouts: self.consecutive_timeouts.load(Ordering::SeqCst),
            reconnection_in_progress: self.reconnection_in_progress.load(Ordering::SeqCst),
            interruptions: self.interruptions.lock().iter().cloned().collect(),
        }
    }

    /// Current consecutive failed status requests.
    #[must_use]
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    async fn current_transport(&self) -> Option<Arc<dyn PushTransport>> {
        self.transport.read().await.clone()
    }

    fn classify(&self, err: &TransportError, context: &str) -> Outcome {
        if err.is_queued_for_retry() {
            tracing::debug!(context, "operation queued due to reconnection");
            Outcome::Queued
        } else {
            tracing::error!(context, error = %err, "transport operation failed");
            Outcome::Failed
        }
    }

    /// Registers the named event listeners on a fresh session.
    ///
    /// Status and feature updates are marshalled through the bridge; the
    /// remaining handlers only touch thread-safe manager state, since they
    /// run on the transport's own execution context.
    fn register_listeners(&self, transport: &Arc<dyn PushTransport>) {
        let listeners = transport.listeners();
        let mut ids = self.listener_ids.lock();

        let bridge = self.bridge.clone();
        ids.push(listeners.on(TransportEventKind::StatusUpdate, move |event| {
            bridge.forward(event.clone());
        }));

        let bridge = self.bridge.clone();
        ids.push(listeners.on(TransportEventKind::FeatureUpdate, move |event| {
            bridge.forward(event.clone());
        }));

        let connected_since = Arc::clone(&self.connected_since);
        ids.push(listeners.on(TransportEventKind::ConnectionLost, move |event| {
            *connected_since.lock() = None;
            if let TransportEvent::ConnectionLost { reason } = event {
                tracing::error!(reason = %reason, "push session connection lost");
            }
        }));

        let connected_since = Arc::clone(&self.connected_since);
        ids.push(listeners.on(TransportEventKind::ConnectionRestored, move |_| {
            let now = Utc::now();
            *connected_since.lock() = Some(now);
            tracing::info!(connected_at = %now, "push session connection restored");
        }));

        let weak = Arc::downgrade(transport);
        ids.push(listeners.on(TransportEventKind::ReconnectionFailed, move |event| {
            if let TransportEvent::ReconnectionFailed { attempts } = event {
                tracing::error!(attempts, "push session reconnection failing, resetting backoff");
            }
            if let Some(transport) = weak.upgrade()
                && let Ok(handle) = tokio::runtime::Handle::try_current()
            {
                handle.spawn(async move { transport.reset_reconnect().await });
            }
        }));

        let interruptions = Arc::clone(&self.interruptions);
        ids.push(listeners.on(TransportEventKind::Interrupted, move |event| {
            if let TransportEvent::Interrupted { reason } = event {
                let mut history = interruptions.lock();
                history.push_back(InterruptionEvent {
                    timestamp: Utc::now(),
                    reason: reason.clone(),
                });
                if history.len() > MAX_INTERRUPTION_HISTORY {
                    history.pop_front();
                }
            }
        }));

        ids.push(listeners.on(TransportEventKind::Resumed, |event| {
            if let TransportEvent::Resumed { session_present } = event {
                tracing::debug!(session_present, "push session resumed");
            }
        }));
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected_since", &*self.connected_since.lock())
            .field(
                "consecutive_timeouts",
                &self.consecutive_timeouts.load(Ordering::SeqCst),
            )
            .field(
                "reconnection_in_progress",
                &self.reconnection_in_progress.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}
