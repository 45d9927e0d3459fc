// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT implementation of the push transport.
//!
//! Topic layout:
//! - Status pushes: `navlink/<mac>/status`
//! - Feature pushes: `navlink/<mac>/feature`
//! - Requests and commands: `navlink/<mac>/command`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cloud::CloudApi;
use crate::command::ControlCommand;
use crate::config::AccountConfig;
use crate::error::TransportError;
use crate::model::{Device, DeviceFeature, DeviceStatus};
use crate::types::MacAddress;

use super::{EventListeners, PushTransport, TransportEvent, TransportFactory};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Consecutive poll failures before a `ReconnectionFailed` event fires.
const RECONNECT_FAILURE_THRESHOLD: u32 = 5;

/// Upper bound on the reconnection backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// MQTT session to the NaviLink broker.
///
/// The session authenticates with the account's access token, so the
/// cloud client is consulted at connect time. Reconnection after a drop
/// is owned by the driver task with exponential backoff; consumers only
/// observe the emitted connection events.
pub struct MqttTransport {
    broker_url: String,
    username: String,
    keep_alive: Duration,
    cloud: Arc<dyn CloudApi>,
    listeners: Arc<EventListeners>,
    client: parking_lot::Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    reconnect_attempts: Arc<AtomicU32>,
    periodic_tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Creates an unconnected session from account configuration.
    #[must_use]
    pub fn new(config: &AccountConfig, cloud: Arc<dyn CloudApi>) -> Self {
        Self {
            broker_url: config.mqtt_url.clone(),
            username: config.email.clone(),
            keep_alive: Duration::from_secs(30),
            cloud,
            listeners: Arc::new(EventListeners::new()),
            client: parking_lot::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            periodic_tasks: parking_lot::Mutex::new(Vec::new()),
            driver: parking_lot::Mutex::new(None),
        }
    }

    fn current_client(&self) -> Result<AsyncClient, TransportError> {
        self.client.lock().clone().ok_or(TransportError::NotConnected)
    }

    /// Publishes a JSON body, reporting the queued classification when the
    /// session is mid-reconnect.
    ///
    /// rumqttc parks requests accepted while the socket is down and
    /// resubmits them once the event loop reconnects, which is exactly the
    /// "cancelled for clean session" case callers must not treat as a
    /// hard failure.
    async fn publish(&self, topic: String, body: &Value) -> Result<(), TransportError> {
        let client = self.current_client()?;
        let was_connected = self.connected.load(Ordering::SeqCst);

        client
            .publish(&topic, QoS::AtLeastOnce, false, body.to_string())
            .await
            .map_err(TransportError::Mqtt)?;

        if was_connected {
            Ok(())
        } else {
            Err(TransportError::CancelledForCleanSession)
        }
    }

    fn spawn_periodic(&self, topic: String, body: Value, interval: Duration) {
        let Ok(client) = self.current_client() else {
            return;
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; periodic requests start one
            // interval out, the immediate request is the caller's call.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = client
                    .publish(&topic, QoS::AtLeastOnce, false, body.to_string())
                    .await
                {
                    tracing::debug!(topic = %topic, error = %e, "periodic request failed");
                }
            }
        });

        self.periodic_tasks.lock().push(handle);
    }
}

#[async_trait]
impl PushTransport for MqttTransport {
    async fn connect(&self) -> Result<bool, TransportError> {
        let (host, port, tls) = parse_broker_url(&self.broker_url)?;

        let token = self
            .cloud
            .access_token()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("token unavailable: {e}")))?;

        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("navlink_{}_{}", std::process::id(), counter);

        let mut options = MqttOptions::new(&client_id, host, port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(self.username.clone(), token);
        if tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        *self.client.lock() = Some(client);

        let (ready_tx, ready_rx) = oneshot::channel();
        let driver = tokio::spawn(drive_session(
            event_loop,
            Arc::clone(&self.listeners),
            Arc::clone(&self.connected),
            Arc::clone(&self.reconnect_attempts),
            ready_tx,
        ));
        *self.driver.lock() = Some(driver);

        let connected = ready_rx.await.map_err(|_| {
            TransportError::ConnectionFailed("session driver exited before handshake".to_string())
        })?;

        Ok(connected)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_all_periodic_tasks().await;

        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }

        let client = self.client.lock().take();
        self.connected.store(false, Ordering::SeqCst);

        if let Some(client) = client {
            client.disconnect().await.map_err(TransportError::Mqtt)?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> &EventListeners {
        &self.listeners
    }

    async fn subscribe_device(&self, device: &Device) -> Result<(), TransportError> {
        let client = self.current_client()?;
        let mac = &device.mac_address;

        client
            .subscribe(status_topic(mac), QoS::AtLeastOnce)
            .await
            .map_err(TransportError::Mqtt)?;
        client
            .subscribe(feature_topic(mac), QoS::AtLeastOnce)
            .await
            .map_err(TransportError::Mqtt)?;

        tracing::debug!(%mac, "subscribed to device topics");
        Ok(())
    }

    async fn start_periodic_status_requests(
        &self,
        device: &Device,
        interval: Duration,
    ) -> Result<(), TransportError> {
        self.current_client()?;
        self.spawn_periodic(
            command_topic(&device.mac_address),
            json!({ "command": "request_status" }),
            interval,
        );
        Ok(())
    }

    async fn start_periodic_info_requests(
        &self,
        device: &Device,
        interval: Duration,
    ) -> Result<(), TransportError> {
        self.current_client()?;
        self.spawn_periodic(
            command_topic(&device.mac_address),
            json!({ "command": "request_info" }),
            interval,
        );
        Ok(())
    }

    async fn stop_all_periodic_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = self.periodic_tasks.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
    }

    async fn request_status(&self, device: &Device) -> Result<(), TransportError> {
        self.publish(
            command_topic(&device.mac_address),
            &json!({ "command": "request_status" }),
        )
        .await
    }

    async fn request_info(&self, device: &Device) -> Result<(), TransportError> {
        self.publish(
            command_topic(&device.mac_address),
            &json!({ "command": "request_info" }),
        )
        .await
    }

    async fn publish_command(
        &self,
        device: &Device,
        command: &ControlCommand,
    ) -> Result<(), TransportError> {
        let mut body = command.payload();
        if let Some(map) = body.as_object_mut() {
            map.insert("command".to_string(), Value::from(command.name()));
        }
        self.publish(command_topic(&device.mac_address), &body).await
    }

    async fn reset_reconnect(&self) {
        self.reconnect_attempts.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("broker_url", &self.broker_url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Drives the MQTT event loop: handshake acknowledgment, publish routing,
/// and reconnection with backoff.
async fn drive_session(
    mut event_loop: EventLoop,
    listeners: Arc<EventListeners>,
    connected: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    ready: oneshot::Sender<bool>,
) {
    let mut ready = Some(ready);
    let mut had_session = false;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                connected.store(true, Ordering::SeqCst);
                attempts.store(0, Ordering::SeqCst);

                if let Some(tx) = ready.take() {
                    tracing::debug!(session_present = ack.session_present, "MQTT connected");
                    let _ = tx.send(true);
                } else if had_session {
                    listeners.emit(&TransportEvent::Resumed {
                        session_present: ack.session_present,
                    });
                    listeners.emit(&TransportEvent::ConnectionRestored);
                }
                had_session = true;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                route_publish(&publish.topic, &publish.payload, &listeners);
            }
            Ok(_) => {}
            Err(e) => {
                let reason = e.to_string();

                if connected.swap(false, Ordering::SeqCst) {
                    listeners.emit(&TransportEvent::Interrupted {
                        reason: reason.clone(),
                    });
                    listeners.emit(&TransportEvent::ConnectionLost {
                        reason: reason.clone(),
                    });
                }

                if let Some(tx) = ready.take() {
                    tracing::warn!(error = %reason, "MQTT handshake failed");
                    let _ = tx.send(false);
                    return;
                }

                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == RECONNECT_FAILURE_THRESHOLD {
                    listeners.emit(&TransportEvent::ReconnectionFailed { attempts: attempt });
                }

                let delay = backoff_delay(attempt);
                tracing::warn!(
                    error = %reason,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "MQTT connection error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Routes an incoming publish to the matching typed event.
fn route_publish(topic: &str, payload: &[u8], listeners: &EventListeners) {
    let mut parts = topic.split('/');
    let (Some("navlink"), Some(mac), Some(channel)) = (parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(topic = %topic, "ignoring publish on unknown topic");
        return;
    };
    let mac = MacAddress::new(mac);

    match channel {
        "status" => match serde_json::from_slice::<DeviceStatus>(payload) {
            Ok(status) => listeners.emit(&TransportEvent::StatusUpdate { mac, status }),
            Err(e) => tracing::warn!(%mac, error = %e, "malformed status payload"),
        },
        "feature" => match serde_json::from_slice::<DeviceFeature>(payload) {
            Ok(feature) => listeners.emit(&TransportEvent::FeatureUpdate { mac, feature }),
            Err(e) => tracing::warn!(%mac, error = %e, "malformed feature payload"),
        },
        other => {
            tracing::debug!(%mac, channel = %other, "ignoring publish on unknown channel");
        }
    }
}

fn status_topic(mac: &MacAddress) -> String {
    format!("navlink/{mac}/status")
}

fn feature_topic(mac: &MacAddress) -> String {
    format!("navlink/{mac}/feature")
}

fn command_topic(mac: &MacAddress) -> String {
    format!("navlink/{mac}/command")
}

/// Parses a broker URL into host, port, and TLS flag.
fn parse_broker_url(url: &str) -> Result<(String, u16, bool), TransportError> {
    let (rest, tls, default_port) = if let Some(rest) = url.strip_prefix("mqtts://") {
        (rest, true, 8883)
    } else if let Some(rest) = url.strip_prefix("mqtt://") {
        (rest, false, 1883)
    } else if let Some(rest) = url.strip_prefix("tcp://") {
        (rest, false, 1883)
    } else {
        (url, false, 1883)
    };

    let (host, port) = if let Some((host, port)) = rest.rsplit_once(':') {
        let port = port
            .parse()
            .map_err(|_| TransportError::InvalidAddress(format!("invalid port: {port}")))?;
        (host.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err(TransportError::InvalidAddress(
            "empty broker host".to_string(),
        ));
    }

    Ok((host, port, tls))
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.min(6))).min(MAX_BACKOFF)
}

/// Creates fresh [`MqttTransport`] sessions for the connection manager.
pub struct MqttTransportFactory {
    config: AccountConfig,
    cloud: Arc<dyn CloudApi>,
}

impl MqttTransportFactory {
    /// Creates a factory bound to one account.
    #[must_use]
    pub fn new(config: AccountConfig, cloud: Arc<dyn CloudApi>) -> Self {
        Self { config, cloud }
    }
}

impl TransportFactory for MqttTransportFactory {
    fn create(&self) -> Arc<dyn PushTransport> {
        Arc::new(MqttTransport::new(&self.config, Arc::clone(&self.cloud)))
    }
}

impl std::fmt::Debug for MqttTransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransportFactory")
            .field("mqtt_url", &self.config.mqtt_url)
            .finish_non_exhaustive()
    }
}
