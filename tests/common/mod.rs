// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared test doubles: a scriptable cloud API and push transport.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use navlink_lib::cloud::{AuthTokens, CloudApi};
use navlink_lib::command::ControlCommand;
use navlink_lib::error::{ApiError, AuthError, TransportError};
use navlink_lib::model::{Device, DeviceFeature, DeviceStatus};
use navlink_lib::transport::{
    EventListeners, PushTransport, TransportEvent, TransportFactory,
};
use navlink_lib::types::MacAddress;

/// Builds a water heater device record for tests.
pub fn test_device(mac: &str, name: &str) -> Device {
    Device::new(MacAddress::new(mac), name, 52, "NWP500")
}

/// Scripted result for one transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Ok,
    HardFail,
    Queued,
}

impl Scripted {
    fn into_result(self) -> Result<(), TransportError> {
        match self {
            Self::Ok => Ok(()),
            Self::HardFail => Err(TransportError::ConnectionFailed(
                "scripted failure".to_string(),
            )),
            Self::Queued => Err(TransportError::CancelledForCleanSession),
        }
    }
}

/// Mock cloud API with a fixed device list and scriptable auth failures.
pub struct MockCloud {
    pub devices: Mutex<Vec<Device>>,
    pub fail_auth: Mutex<Option<AuthFailure>>,
    pub authenticate_calls: AtomicU32,
    pub token_checks: AtomicU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    Network,
}

impl MockCloud {
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            fail_auth: Mutex::new(None),
            authenticate_calls: AtomicU32::new(0),
            token_checks: AtomicU32::new(0),
        }
    }

    fn auth_result(&self) -> Result<(), AuthError> {
        match *self.fail_auth.lock() {
            None => Ok(()),
            Some(AuthFailure::InvalidCredentials) => Err(AuthError::InvalidCredentials),
            Some(AuthFailure::Network) => {
                Err(AuthError::RefreshFailed("network unreachable".to_string()))
            }
        }
    }
}

#[async_trait]
impl CloudApi for MockCloud {
    async fn authenticate(&self) -> Result<(), AuthError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        self.auth_result()
    }

    async fn ensure_valid_token(&self) -> Result<(), AuthError> {
        self.token_checks.fetch_add(1, Ordering::SeqCst);
        self.auth_result()
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.auth_result().map(|()| "test-token".to_string())
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        Ok(self.devices.lock().clone())
    }

    async fn current_tokens(&self) -> Option<AuthTokens> {
        None
    }
}

/// Mock push transport recording every operation.
pub struct MockTransport {
    listeners: EventListeners,
    connected: AtomicBool,
    connect_ok: bool,
    pub fail_subscribe: Mutex<HashSet<MacAddress>>,
    pub subscribed: Mutex<Vec<MacAddress>>,
    pub status_script: Mutex<VecDeque<Scripted>>,
    pub status_requests: AtomicU32,
    pub info_requests: AtomicU32,
    pub commands: Mutex<Vec<(MacAddress, String)>>,
    pub command_result: Mutex<Scripted>,
    pub disconnect_count: AtomicU32,
    pub periodic_status_started: AtomicU32,
    pub periodic_info_started: AtomicU32,
    pub periodic_stops: AtomicU32,
}

impl MockTransport {
    pub fn new(connect_ok: bool) -> Self {
        Self {
            listeners: EventListeners::new(),
            connected: AtomicBool::new(false),
            connect_ok,
            fail_subscribe: Mutex::new(HashSet::new()),
            subscribed: Mutex::new(Vec::new()),
            status_script: Mutex::new(VecDeque::new()),
            status_requests: AtomicU32::new(0),
            info_requests: AtomicU32::new(0),
            commands: Mutex::new(Vec::new()),
            command_result: Mutex::new(Scripted::Ok),
            disconnect_count: AtomicU32::new(0),
            periodic_status_started: AtomicU32::new(0),
            periodic_info_started: AtomicU32::new(0),
            periodic_stops: AtomicU32::new(0),
        }
    }

    /// Scripts the next status request results, in order.
    pub fn script_status_requests(&self, results: &[Scripted]) {
        self.status_script.lock().extend(results.iter().copied());
    }

    /// Emits a status push, as the broker would.
    pub fn emit_status(&self, mac: &str, status: DeviceStatus) {
        self.listeners.emit(&TransportEvent::StatusUpdate {
            mac: MacAddress::new(mac),
            status,
        });
    }

    /// Emits a feature push, as the broker would.
    pub fn emit_feature(&self, mac: &str, feature: DeviceFeature) {
        self.listeners.emit(&TransportEvent::FeatureUpdate {
            mac: MacAddress::new(mac),
            feature,
        });
    }

    pub fn status_request_count(&self) -> u32 {
        self.status_requests.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.listener_count()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&self) -> Result<bool, TransportError> {
        self.connected.store(self.connect_ok, Ordering::SeqCst);
        Ok(self.connect_ok)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> &EventListeners {
        &self.listeners
    }

    async fn subscribe_device(&self, device: &Device) -> Result<(), TransportError> {
        if self.fail_subscribe.lock().contains(&device.mac_address) {
            return Err(TransportError::ConnectionFailed(
                "scripted subscribe failure".to_string(),
            ));
        }
        self.subscribed.lock().push(device.mac_address.clone());
        Ok(())
    }

    async fn start_periodic_status_requests(
        &self,
        _device: &Device,
        _interval: std::time::Duration,
    ) -> Result<(), TransportError> {
        self.periodic_status_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_periodic_info_requests(
        &self,
        _device: &Device,
        _interval: std::time::Duration,
    ) -> Result<(), TransportError> {
        self.periodic_info_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_all_periodic_tasks(&self) {
        self.periodic_stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn request_status(&self, _device: &Device) -> Result<(), TransportError> {
        self.status_requests.fetch_add(1, Ordering::SeqCst);
        let scripted = self.status_script.lock().pop_front().unwrap_or(Scripted::Ok);
        scripted.into_result()
    }

    async fn request_info(&self, _device: &Device) -> Result<(), TransportError> {
        self.info_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn publish_command(
        &self,
        device: &Device,
        command: &ControlCommand,
    ) -> Result<(), TransportError> {
        self.commands
            .lock()
            .push((device.mac_address.clone(), command.name().to_string()));
        self.command_result.lock().into_result()
    }

    async fn reset_reconnect(&self) {}
}

/// Factory handing out fresh mock transports and remembering each one.
pub struct MockTransportFactory {
    pub created: Mutex<Vec<Arc<MockTransport>>>,
    pub next_connect_ok: AtomicBool,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            next_connect_ok: AtomicBool::new(true),
        }
    }

    /// Returns the most recently created transport.
    pub fn latest(&self) -> Arc<MockTransport> {
        Arc::clone(self.created.lock().last().expect("no transport created"))
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Arc<dyn PushTransport> {
        let transport = Arc::new(MockTransport::new(
            self.next_connect_ok.load(Ordering::SeqCst),
        ));
        self.created.lock().push(Arc::clone(&transport));
        transport
    }
}
