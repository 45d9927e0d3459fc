// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Update coordination: the single authoritative store of per-device state.
//!
//! The coordinator merges two update paths. Polling (`refresh`) is a
//! trigger, not a wait: it fires status requests and returns, leaving
//! cached state untouched for devices that have not answered yet. Real
//! data arrives asynchronously over the event bridge and replaces each
//! device's snapshot wholesale, after which subscribers are notified
//! exactly once per update.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::bridge::EventBridge;
use crate::cloud::{AuthTokens, CloudApi, NavienCloud};
use crate::command::ControlCommand;
use crate::config::AccountConfig;
use crate::error::{ApiError, Error, Result};
use crate::manager::{ConnectionDiagnostics, ConnectionManager};
use crate::model::{Device, DeviceFeature, DeviceStatus, Reservation};
use crate::transport::{MqttTransportFactory, TransportEvent, TransportFactory};
use crate::types::{MacAddress, Outcome};

/// Deadline on each poll-triggered request, so one wedged request cannot
/// hang the whole refresh cycle.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh durations above this are logged as unusually slow. Cloud
/// round-trips normally complete in 2-4 seconds.
const SLOW_UPDATE_THRESHOLD: Duration = Duration::from_secs(5);

/// Consecutive poll timeouts before a forced reconnect is scheduled.
const TIMEOUT_RECONNECT_THRESHOLD: u32 = 3;

/// A fallback device info request fires every this many refresh cycles,
/// in case the transport-owned periodic timer died with a session.
const INFO_FALLBACK_CYCLE: u32 = 10;

/// Bound on the retained poll timeout history.
const MAX_TIMEOUT_HISTORY: usize = 20;

/// Per-device state aggregate.
///
/// `status` and `feature` are replaced atomically and independently of
/// each other; a consumer may see a fresh status next to an older feature
/// snapshot, which is accepted.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    /// The immutable identity record.
    pub device: Device,
    /// Most recent telemetry snapshot, absent until the first push.
    pub status: Option<Arc<DeviceStatus>>,
    /// When `status` was last replaced.
    pub last_update: Option<DateTime<Utc>>,
    /// Most recent capability snapshot, absent until the first push.
    pub feature: Option<Arc<DeviceFeature>>,
}

impl DeviceEntry {
    fn new(device: Device) -> Self {
        Self {
            device,
            status: None,
            last_update: None,
            feature: None,
        }
    }
}

/// Notification published to coordinator subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A device appeared in the account's device list.
    DeviceDiscovered {
        /// The discovered device.
        mac: MacAddress,
    },
    /// A device's telemetry snapshot was replaced.
    StatusUpdated {
        /// The updated device.
        mac: MacAddress,
    },
    /// A device's capability snapshot was replaced.
    FeatureUpdated {
        /// The updated device.
        mac: MacAddress,
    },
}

/// One recorded poll timeout, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct TimeoutEvent {
    /// When the timeout was observed.
    pub timestamp: DateTime<Utc>,
    /// The device whose request timed out.
    pub mac: MacAddress,
    /// Value of the consecutive-timeout counter at that point.
    pub consecutive_count: u32,
}

/// Coordinator refresh performance counters.
#[derive(Debug, Clone, Default)]
pub struct PerformanceStats {
    /// Completed refresh cycles.
    pub update_count: u64,
    /// Mean refresh duration.
    pub average_time: Duration,
    /// Slowest refresh duration seen.
    pub slowest_time: Duration,
    /// Total time spent refreshing.
    pub total_time: Duration,
}

/// Request/response telemetry for diagnostics surfaces.
#[derive(Debug, Clone)]
pub struct MqttTelemetry {
    /// Identifier of the last status request sent.
    pub last_request_id: Option<String>,
    /// When the last status request was sent.
    pub last_request_time: Option<DateTime<Utc>>,
    /// Identifier of the last status response received.
    pub last_response_id: Option<String>,
    /// When the last status response arrived.
    pub last_response_time: Option<DateTime<Utc>>,
    /// Total status requests sent.
    pub total_requests_sent: u64,
    /// Total status responses received.
    pub total_responses_received: u64,
    /// Whether the push session is currently connected.
    pub mqtt_connected: bool,
    /// When the push session connected, if it is up.
    pub mqtt_connected_since: Option<DateTime<Utc>>,
    /// Consecutive poll timeouts (coordinator-level counter).
    pub consecutive_timeouts: u32,
    /// Recent poll timeouts, oldest first.
    pub timeout_history: Vec<TimeoutEvent>,
}

#[derive(Default)]
struct TelemetryState {
    last_request_id: Option<String>,
    last_request_time: Option<DateTime<Utc>>,
    last_response_id: Option<String>,
    last_response_time: Option<DateTime<Utc>>,
    total_requests_sent: u64,
    total_responses_received: u64,
    timeout_history: VecDeque<TimeoutEvent>,
}

#[derive(Default)]
struct PerfState {
    update_count: u64,
    total_time: Duration,
    slowest: Duration,
}

/// State shared with the bridge drain task.
struct SharedState {
    entries: RwLock<HashMap<MacAddress, DeviceEntry>>,
    events: broadcast::Sender<SyncEvent>,
    telemetry: parking_lot::Mutex<TelemetryState>,
    consecutive_timeouts: AtomicU32,
}

impl SharedState {
    /// Replaces a device's telemetry snapshot wholesale.
    ///
    /// Updates for addresses the coordinator has never seen are dropped
    /// and logged; queuing them would only mask a discovery race.
    async fn apply_status(&self, mac: &MacAddress, status: DeviceStatus) {
        let now = Utc::now();

        {
            let mut telemetry = self.telemetry.lock();
            telemetry.total_responses_received += 1;
            let latency = telemetry
                .last_request_time
                .map(|sent| (now - sent).num_milliseconds());
            telemetry.last_response_id = Some(format!("{mac}_{}", now.timestamp_millis()));
            telemetry.last_response_time = Some(now);
            tracing::debug!(
                %mac,
                last_request = telemetry.last_request_id.as_deref().unwrap_or("n/a"),
                latency_ms = ?latency,
                "received device status update"
            );
        }
        self.consecutive_timeouts.store(0, Ordering::SeqCst);

        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(mac) else {
            tracing::warn!(%mac, "dropping status update for unknown device");
            return;
        };
        entry.status = Some(Arc::new(status));
        entry.last_update = Some(now);
        drop(entries);

        let _ = self.events.send(SyncEvent::StatusUpdated { mac: mac.clone() });
    }

    /// Replaces a device's capability snapshot; independent of status.
    async fn apply_feature(&self, mac: &MacAddress, feature: DeviceFeature) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(mac) else {
            tracing::warn!(%mac, "dropping feature update for unknown device");
            return;
        };
        tracing::info!(
            %mac,
            serial = entry_serial(&feature),
            "received device feature update"
        );
        entry.feature = Some(Arc::new(feature));
        drop(entries);

        let _ = self.events.send(SyncEvent::FeatureUpdated { mac: mac.clone() });
    }
}

fn entry_serial(feature: &DeviceFeature) -> &str {
    feature
        .controller_serial_number
        .as_deref()
        .unwrap_or("unknown")
}

/// Coordinates device discovery, polling, push updates, and commands for
/// one account.
///
/// Construct one per account via [`UpdateCoordinator::new`] (injected
/// collaborators, used by tests) or [`UpdateCoordinator::for_account`]
/// (production cloud and MQTT implementations).
pub struct UpdateCoordinator {
    cloud: Arc<dyn CloudApi>,
    manager: Arc<ConnectionManager>,
    shared: Arc<SharedState>,
    devices: RwLock<Vec<Device>>,
    started: AtomicBool,
    bridge_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    drain_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<bool>>>,
    info_request_counters: parking_lot::Mutex<HashMap<MacAddress, u32>>,
    perf: parking_lot::Mutex<PerfState>,
}

impl UpdateCoordinator {
    /// Creates a coordinator with injected collaborators.
    #[must_use]
    pub fn new(
        config: &AccountConfig,
        cloud: Arc<dyn CloudApi>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (bridge, bridge_rx) = EventBridge::channel();
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&cloud),
            factory,
            bridge,
            config,
        ));
        let (events, _) = broadcast::channel(64);

        Self {
            cloud,
            manager,
            shared: Arc::new(SharedState {
                entries: RwLock::new(HashMap::new()),
                events,
                telemetry: parking_lot::Mutex::new(TelemetryState::default()),
                consecutive_timeouts: AtomicU32::new(0),
            }),
            devices: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
            bridge_rx: Mutex::new(Some(bridge_rx)),
            drain_task: parking_lot::Mutex::new(None),
            reconnect_task: Mutex::new(None),
            info_request_counters: parking_lot::Mutex::new(HashMap::new()),
            perf: parking_lot::Mutex::new(PerfState::default()),
        }
    }

    /// Creates a coordinator wired to the production NaviLink cloud.
    #[must_use]
    pub fn for_account(config: &AccountConfig) -> Self {
        let cloud: Arc<dyn CloudApi> = Arc::new(NavienCloud::new(config));
        let factory: Arc<dyn TransportFactory> = Arc::new(MqttTransportFactory::new(
            config.clone(),
            Arc::clone(&cloud),
        ));
        Self::new(config, cloud, factory)
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Refreshes device state.
    ///
    /// The first call runs full setup: authentication, device discovery,
    /// push session setup, per-device subscription, and periodic request
    /// start. A failure there surfaces as `Err`, and the supervisor is
    /// expected to retry the whole setup later. Subsequent calls only
    /// trigger an on-demand status request per device; cached state is
    /// preserved for devices that have not answered by the time this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] for setup failures (invalid credentials, no
    /// devices, unreachable service). Steady-state request failures are
    /// logged and counted, not returned.
    pub async fn refresh(&self) -> Result<()> {
        let start = Instant::now();

        if !self.started.load(Ordering::SeqCst) {
            self.setup_clients().await?;
        }

        if !self.manager.is_connected().await {
            tracing::error!(
                "push session is not connected; device status requests will fail until it recovers"
            );
        }

        let devices = self.devices.read().await.clone();
        for device in &devices {
            self.ensure_entry(device).await;
            self.stamp_request(&device.mac_address);

            let triggered = tokio::time::timeout(
                REQUEST_TIMEOUT,
                self.manager.request_status(device),
            )
            .await;

            match triggered {
                Ok(true) => {
                    tracing::debug!(mac = %device.mac_address, "requested status update");
                    self.maybe_request_info_fallback(device).await;
                }
                Ok(false) | Err(_) => {
                    self.note_request_timeout(&device.mac_address, &devices).await;
                }
            }
        }

        self.record_refresh_duration(start.elapsed(), devices.len());
        Ok(())
    }

    /// Runs authentication, discovery, and push session setup.
    async fn setup_clients(&self) -> Result<()> {
        if let Err(err) = self.cloud.authenticate().await {
            if err.is_retriable() {
                tracing::warn!(error = %err, "network error during authentication, will retry");
            } else {
                tracing::error!(error = %err, "authentication failed");
            }
            self.manager.disconnect().await;
            return Err(err.into());
        }

        let devices = match self.cloud.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                tracing::error!(error = %err, "failed to list devices");
                self.manager.disconnect().await;
                return Err(err.into());
            }
        };
        if devices.is_empty() {
            tracing::error!(
                "no devices found for this account; verify the device is registered and online"
            );
            return Err(Error::Api(ApiError::NoDevices));
        }
        tracing::info!(count = devices.len(), "found devices");

        {
            let mut entries = self.shared.entries.write().await;
            for device in &devices {
                entries
                    .entry(device.mac_address.clone())
                    .or_insert_with(|| DeviceEntry::new(device.clone()));
            }
        }
        *self.devices.write().await = devices.clone();
        for device in &devices {
            let _ = self.shared.events.send(SyncEvent::DeviceDiscovered {
                mac: device.mac_address.clone(),
            });
        }

        self.spawn_drain_task().await;

        if self.manager.setup().await {
            for device in &devices {
                self.manager.subscribe_device(device).await;
                self.manager.start_periodic_requests(device).await;

                tracing::info!(mac = %device.mac_address, "requesting initial device info");
                if !self.manager.request_device_info(device).await {
                    tracing::warn!(
                        mac = %device.mac_address,
                        "failed to request initial device info"
                    );
                }
            }
        } else {
            tracing::warn!("failed to connect push session, continuing in API-only mode");
        }

        self.started.store(true, Ordering::SeqCst);
        tracing::info!(count = devices.len(), "connected to cloud service");
        Ok(())
    }

    /// Starts the task that applies bridged push events to shared state.
    async fn spawn_drain_task(&self) {
        let Some(mut rx) = self.bridge_rx.lock().await.take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    TransportEvent::StatusUpdate { mac, status } => {
                        shared.apply_status(&mac, status).await;
                    }
                    TransportEvent::FeatureUpdate { mac, feature } => {
                        shared.apply_feature(&mac, feature).await;
                    }
                    other => {
                        tracing::debug!(kind = ?other.kind(), "unhandled bridged event");
                    }
                }
            }
            tracing::debug!("event bridge closed, update handler stopping");
        });

        *self.drain_task.lock() = Some(handle);
    }

    async fn ensure_entry(&self, device: &Device) {
        let mut entries = self.shared.entries.write().await;
        entries
            .entry(device.mac_address.clone())
            .or_insert_with(|| DeviceEntry::new(device.clone()));
    }

    fn stamp_request(&self, mac: &MacAddress) {
        let now = Utc::now();
        let mut telemetry = self.shared.telemetry.lock();
        telemetry.total_requests_sent += 1;
        let request_id = format!("{mac}_{}", now.timestamp_millis());
        tracing::debug!(
            %mac,
            request_id = %request_id,
            total_sent = telemetry.total_requests_sent,
            "sending status request"
        );
        telemetry.last_request_id = Some(request_id);
        telemetry.last_request_time = Some(now);
    }

    /// Fires the fallback device info request every Nth refresh cycle.
    async fn maybe_request_info_fallback(&self, device: &Device) {
        let due = {
            let mut counters = self.info_request_counters.lock();
            let counter = counters.entry(device.mac_address.clone()).or_insert(0);
            *counter = (*counter + 1) % INFO_FALLBACK_CYCLE;
            *counter == 0
        };
        if !due {
            return;
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, self.manager.request_device_info(device)).await
        {
            Ok(_) => {
                tracing::debug!(mac = %device.mac_address, "fallback device info request sent");
            }
            Err(_) => {
                tracing::warn!(
                    mac = %device.mac_address,
                    "timeout on fallback device info request"
                );
            }
        }
    }

    /// Records a poll timeout; past the threshold, schedules a forced
    /// reconnect (cancelling one already scheduled).
    async fn note_request_timeout(&self, mac: &MacAddress, devices: &[Device]) {
        let count = self.shared.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut telemetry = self.shared.telemetry.lock();
            telemetry.timeout_history.push_back(TimeoutEvent {
                timestamp: Utc::now(),
                mac: mac.clone(),
                consecutive_count: count,
            });
            if telemetry.timeout_history.len() > MAX_TIMEOUT_HISTORY {
                telemetry.timeout_history.pop_front();
            }
        }

        tracing::error!(
            %mac,
            consecutive = count,
            "timeout requesting device status; push session may be down"
        );

        if count >= TIMEOUT_RECONNECT_THRESHOLD {
            tracing::warn!(consecutive = count, "scheduling forced reconnection");

            let mut slot = self.reconnect_task.lock().await;
            if let Some(task) = slot.take()
                && !task.is_finished()
            {
                task.abort();
                tracing::debug!("cancelled previous reconnection task");
            }

            let manager = Arc::clone(&self.manager);
            let devices = devices.to_vec();
            *slot = Some(tokio::spawn(async move {
                manager.force_reconnect(&devices).await
            }));
        }
    }

    fn record_refresh_duration(&self, duration: Duration, device_count: usize) {
        let (count, average, slowest) = {
            let mut perf = self.perf.lock();
            perf.update_count += 1;
            perf.total_time += duration;
            if duration > perf.slowest {
                perf.slowest = duration;
            }
            (
                perf.update_count,
                perf.total_time / u32::try_from(perf.update_count).unwrap_or(u32::MAX),
                perf.slowest,
            )
        };

        tracing::debug!(
            update = count,
            duration_ms = duration.as_millis(),
            device_count,
            average_ms = average.as_millis(),
            slowest_ms = slowest.as_millis(),
            "coordinator refresh completed"
        );

        if duration > SLOW_UPDATE_THRESHOLD {
            tracing::warn!(
                duration_ms = duration.as_millis(),
                threshold_ms = SLOW_UPDATE_THRESHOLD.as_millis(),
                "slow coordinator refresh; possible network latency"
            );
        }
    }

    // =========================================================================
    // Consumer Surface
    // =========================================================================

    /// Returns the current state entry for a device, if known.
    pub async fn get_device_state(&self, mac: &MacAddress) -> Option<DeviceEntry> {
        self.shared.entries.read().await.get(mac).cloned()
    }

    /// Returns the discovered devices.
    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    /// Subscribes to state-change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Sends a control command to a device.
    ///
    /// Unknown addresses fail immediately; otherwise the connection
    /// manager's outcome is returned unchanged.
    pub async fn send_control_command(
        &self,
        mac: &MacAddress,
        command: &ControlCommand,
    ) -> Outcome {
        let Some(device) = self.find_device(mac).await else {
            tracing::error!(%mac, "device not found");
            return Outcome::Failed;
        };

        self.manager.send_command(&device, command).await
    }

    /// Replaces a device's reservation schedule.
    pub async fn update_reservations(
        &self,
        mac: &MacAddress,
        entries: Vec<Reservation>,
        enabled: bool,
    ) -> Outcome {
        self.send_control_command(mac, &ControlCommand::UpdateReservations { entries, enabled })
            .await
    }

    /// Asks a device to publish its current reservation schedule.
    pub async fn request_reservations(&self, mac: &MacAddress) -> Outcome {
        self.send_control_command(mac, &ControlCommand::RequestReservations)
            .await
    }

    /// Manually requests device info for one device, or all when `mac`
    /// is `None`. Returns `true` if at least one request was sent.
    pub async fn request_device_info(&self, mac: Option<&MacAddress>) -> bool {
        let targets: Vec<Device> = match mac {
            Some(mac) => self.find_device(mac).await.into_iter().collect(),
            None => self.devices.read().await.clone(),
        };

        if targets.is_empty() {
            tracing::error!("no devices found for device info request");
            return false;
        }

        let mut sent = 0usize;
        for device in &targets {
            if self.manager.request_device_info(device).await {
                tracing::info!(mac = %device.mac_address, "sent manual device info request");
                sent += 1;
            } else {
                tracing::error!(
                    mac = %device.mac_address,
                    "failed to send manual device info request"
                );
            }
        }
        sent > 0
    }

    /// Applies a pushed status snapshot.
    ///
    /// Exposed for consumers that receive pushes out of band; the normal
    /// path is the event bridge.
    pub async fn on_status_received(&self, mac: &MacAddress, status: DeviceStatus) {
        self.shared.apply_status(mac, status).await;
    }

    /// Applies a pushed capability snapshot.
    pub async fn on_feature_received(&self, mac: &MacAddress, feature: DeviceFeature) {
        self.shared.apply_feature(mac, feature).await;
    }

    /// Returns the currently held auth tokens, for persistence.
    pub async fn auth_tokens(&self) -> Option<AuthTokens> {
        self.cloud.current_tokens().await
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Connection-level diagnostics from the manager.
    pub async fn connection_diagnostics(&self) -> ConnectionDiagnostics {
        self.manager.diagnostics().await
    }

    /// Refresh performance counters.
    #[must_use]
    pub fn performance_stats(&self) -> PerformanceStats {
        let perf = self.perf.lock();
        if perf.update_count == 0 {
            return PerformanceStats::default();
        }
        PerformanceStats {
            update_count: perf.update_count,
            average_time: perf.total_time / u32::try_from(perf.update_count).unwrap_or(u32::MAX),
            slowest_time: perf.slowest,
            total_time: perf.total_time,
        }
    }

    /// Request/response telemetry for diagnostics surfaces.
    pub async fn mqtt_telemetry(&self) -> MqttTelemetry {
        let diagnostics = self.manager.diagnostics().await;
        let telemetry = self.shared.telemetry.lock();

        MqttTelemetry {
            last_request_id: telemetry.last_request_id.clone(),
            last_request_time: telemetry.last_request_time,
            last_response_id: telemetry.last_response_id.clone(),
            last_response_time: telemetry.last_response_time,
            total_requests_sent: telemetry.total_requests_sent,
            total_responses_received: telemetry.total_responses_received,
            mqtt_connected: diagnostics.is_connected,
            mqtt_connected_since: diagnostics.connected_since,
            consecutive_timeouts: self.shared.consecutive_timeouts.load(Ordering::SeqCst),
            timeout_history: telemetry.timeout_history.iter().cloned().collect(),
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Shuts the coordinator down: cancels pending work and closes the
    /// push session. Device entries are dropped with the coordinator.
    pub async fn shutdown(&self) {
        if let Some(task) = self.reconnect_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.drain_task.lock().take() {
            task.abort();
        }
        self.manager.disconnect().await;
    }

    async fn find_device(&self, mac: &MacAddress) -> Option<Device> {
        self.devices
            .read()
            .await
            .iter()
            .find(|device| &device.mac_address == mac)
            .cloned()
    }
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
