// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coordinator scenarios against mocked cloud and transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{AuthFailure, MockCloud, MockTransportFactory, Scripted, test_device};
use navlink_lib::cloud::CloudApi;
use navlink_lib::command::ControlCommand;
use navlink_lib::config::AccountConfig;
use navlink_lib::coordinator::{SyncEvent, UpdateCoordinator};
use navlink_lib::error::{ApiError, AuthError, Error};
use navlink_lib::model::{DeviceFeature, DeviceStatus};
use navlink_lib::transport::{PushTransport, TransportFactory};
use navlink_lib::types::{MacAddress, Outcome};

const MAC: &str = "04:78:63:aa:bb:cc";

struct Fixture {
    coordinator: UpdateCoordinator,
    cloud: Arc<MockCloud>,
    factory: Arc<MockTransportFactory>,
}

fn fixture_with_devices(devices: Vec<navlink_lib::Device>) -> Fixture {
    let cloud = Arc::new(MockCloud::with_devices(devices));
    let factory = Arc::new(MockTransportFactory::new());
    let config = AccountConfig::new("user@example.com", "secret");

    let coordinator = UpdateCoordinator::new(
        &config,
        Arc::clone(&cloud) as Arc<dyn CloudApi>,
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    Fixture {
        coordinator,
        cloud,
        factory,
    }
}

fn fixture() -> Fixture {
    fixture_with_devices(vec![test_device(MAC, "Garage Water Heater")])
}

async fn recv_event(
    rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>,
) -> Option<SyncEvent> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .and_then(std::result::Result::ok)
}

// ============================================================================
// Setup and Refresh
// ============================================================================

#[tokio::test]
async fn first_refresh_discovers_devices_with_empty_state() {
    let f = fixture();

    f.coordinator.refresh().await.unwrap();

    let mac = MacAddress::new(MAC);
    let entry = f.coordinator.get_device_state(&mac).await.unwrap();
    assert_eq!(entry.device.name, "Garage Water Heater");
    assert!(entry.status.is_none());
    assert!(entry.last_update.is_none());
    assert!(entry.feature.is_none());
    assert_eq!(f.coordinator.devices().await.len(), 1);
}

#[tokio::test]
async fn first_refresh_subscribes_and_starts_periodic_requests() {
    let f = fixture();

    f.coordinator.refresh().await.unwrap();

    let transport = f.factory.latest();
    let ordering = std::sync::atomic::Ordering::SeqCst;
    assert_eq!(transport.subscribed.lock().len(), 1);
    assert_eq!(transport.periodic_status_started.load(ordering), 1);
    assert_eq!(transport.periodic_info_started.load(ordering), 1);
}

#[tokio::test]
async fn subsequent_refresh_skips_discovery_and_triggers_polling() {
    let f = fixture();

    f.coordinator.refresh().await.unwrap();
    f.coordinator.refresh().await.unwrap();

    let ordering = std::sync::atomic::Ordering::SeqCst;
    assert_eq!(f.cloud.authenticate_calls.load(ordering), 1);
    // One poll trigger per refresh.
    assert_eq!(f.factory.latest().status_request_count(), 2);
    assert_eq!(f.factory.created_count(), 1);
}

#[tokio::test]
async fn refresh_with_no_devices_is_a_setup_failure() {
    let f = fixture_with_devices(Vec::new());

    let err = f.coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Api(ApiError::NoDevices)));

    // Setup did not complete; the next refresh retries it from scratch.
    let _ = f.coordinator.refresh().await.unwrap_err();
    let ordering = std::sync::atomic::Ordering::SeqCst;
    assert_eq!(f.cloud.authenticate_calls.load(ordering), 2);
}

#[tokio::test]
async fn refresh_with_invalid_credentials_is_a_setup_failure() {
    let f = fixture();
    *f.cloud.fail_auth.lock() = Some(AuthFailure::InvalidCredentials);

    let err = f.coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn refresh_survives_push_session_failure_in_api_only_mode() {
    let f = fixture();
    f.factory
        .next_connect_ok
        .store(false, std::sync::atomic::Ordering::SeqCst);

    // MQTT down is degraded, not fatal: setup completes.
    f.coordinator.refresh().await.unwrap();

    assert!(!f.coordinator.connection_diagnostics().await.is_connected);
    assert_eq!(f.coordinator.devices().await.len(), 1);
}

// ============================================================================
// Push Updates
// ============================================================================

#[tokio::test]
async fn status_push_updates_state_and_notifies_once() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let mut events = f.coordinator.subscribe();

    let status = DeviceStatus {
        tank_upper_temperature: Some(128.5),
        ..DeviceStatus::default()
    };
    f.factory.latest().emit_status(MAC, status);

    let mac = MacAddress::new(MAC);
    assert_eq!(
        recv_event(&mut events).await,
        Some(SyncEvent::StatusUpdated { mac: mac.clone() })
    );
    // Exactly one notification per update.
    assert!(events.try_recv().is_err());

    let entry = f.coordinator.get_device_state(&mac).await.unwrap();
    assert_eq!(
        entry.status.as_ref().unwrap().tank_upper_temperature,
        Some(128.5)
    );
    assert!(entry.last_update.is_some());
}

#[tokio::test]
async fn status_push_for_unknown_device_is_dropped() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let mut events = f.coordinator.subscribe();

    f.factory
        .latest()
        .emit_status("ff:ff:ff:ff:ff:ff", DeviceStatus::default());

    // No entry is created and no notification fires.
    assert_eq!(recv_event(&mut events).await, None);
    assert!(
        f.coordinator
            .get_device_state(&MacAddress::new("ff:ff:ff:ff:ff:ff"))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn status_replacement_is_wholesale() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let mut events = f.coordinator.subscribe();
    let mac = MacAddress::new(MAC);
    let transport = f.factory.latest();

    transport.emit_status(
        MAC,
        DeviceStatus {
            tank_upper_temperature: Some(120.0),
            error_code: Some(515),
            ..DeviceStatus::default()
        },
    );
    recv_event(&mut events).await.unwrap();
    let first = f.coordinator.get_device_state(&mac).await.unwrap();

    transport.emit_status(
        MAC,
        DeviceStatus {
            dhw_charge_per: Some(91.0),
            ..DeviceStatus::default()
        },
    );
    recv_event(&mut events).await.unwrap();
    let second = f.coordinator.get_device_state(&mac).await.unwrap();

    // The new snapshot is a different object and no field of the old one
    // survives into it.
    let old = first.status.unwrap();
    let new = second.status.unwrap();
    assert!(!Arc::ptr_eq(&old, &new));
    assert_eq!(new.dhw_charge_per, Some(91.0));
    assert_eq!(new.tank_upper_temperature, None);
    assert_eq!(new.error_code, None);
}

#[tokio::test]
async fn feature_push_is_independent_of_status() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let mut events = f.coordinator.subscribe();
    let mac = MacAddress::new(MAC);

    let feature = DeviceFeature {
        controller_serial_number: Some("N5X-00417".to_string()),
        dhw_temperature_min: Some(80.0),
        dhw_temperature_max: Some(150.0),
        ..DeviceFeature::default()
    };
    f.factory.latest().emit_feature(MAC, feature);

    assert_eq!(
        recv_event(&mut events).await,
        Some(SyncEvent::FeatureUpdated { mac: mac.clone() })
    );

    let entry = f.coordinator.get_device_state(&mac).await.unwrap();
    assert_eq!(
        entry.feature.as_ref().unwrap().temperature_range(),
        Some((80.0, 150.0))
    );
    // Feature arrival does not fabricate a status or a status timestamp.
    assert!(entry.status.is_none());
    assert!(entry.last_update.is_none());
}

#[tokio::test]
async fn status_push_updates_response_telemetry() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let mut events = f.coordinator.subscribe();

    f.factory.latest().emit_status(MAC, DeviceStatus::default());
    recv_event(&mut events).await.unwrap();

    let telemetry = f.coordinator.mqtt_telemetry().await;
    assert_eq!(telemetry.total_requests_sent, 1);
    assert_eq!(telemetry.total_responses_received, 1);
    assert!(telemetry.last_response_id.is_some());
    assert_eq!(telemetry.consecutive_timeouts, 0);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn command_dispatch_triggers_one_followup_status_request() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let transport = f.factory.latest();
    let baseline = transport.status_request_count();

    let outcome = f
        .coordinator
        .send_control_command(
            &MacAddress::new(MAC),
            &ControlCommand::SetPower { power_on: true },
        )
        .await;

    assert_eq!(outcome, Outcome::Sent);
    let commands = transport.commands.lock().clone();
    assert_eq!(commands, vec![(MacAddress::new(MAC), "set_power".to_string())]);
    assert_eq!(transport.status_request_count(), baseline + 1);
}

#[tokio::test]
async fn command_for_unknown_device_fails_without_dispatch() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let transport = f.factory.latest();

    let outcome = f
        .coordinator
        .send_control_command(
            &MacAddress::new("ff:ff:ff:ff:ff:ff"),
            &ControlCommand::SetPower { power_on: true },
        )
        .await;

    assert_eq!(outcome, Outcome::Failed);
    assert!(transport.commands.lock().is_empty());
}

#[tokio::test]
async fn failed_command_leaves_state_unchanged() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();
    let mac = MacAddress::new(MAC);
    let transport = f.factory.latest();
    *transport.command_result.lock() = Scripted::HardFail;

    let before = f.coordinator.get_device_state(&mac).await.unwrap();
    let outcome = f
        .coordinator
        .send_control_command(&mac, &ControlCommand::SetTemperature { temperature: 140.0 })
        .await;
    let after = f.coordinator.get_device_state(&mac).await.unwrap();

    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(before.status.is_none(), after.status.is_none());
    assert_eq!(before.last_update, after.last_update);
}

#[tokio::test]
async fn request_device_info_for_all_devices() {
    let f = fixture_with_devices(vec![
        test_device(MAC, "Heater A"),
        test_device("bb:bb:bb:bb:bb:bb", "Heater B"),
    ]);
    f.coordinator.refresh().await.unwrap();
    let transport = f.factory.latest();
    let ordering = std::sync::atomic::Ordering::SeqCst;
    let baseline = transport.info_requests.load(ordering);

    assert!(f.coordinator.request_device_info(None).await);
    assert_eq!(transport.info_requests.load(ordering), baseline + 2);

    assert!(
        f.coordinator
            .request_device_info(Some(&MacAddress::new(MAC)))
            .await
    );
    assert_eq!(transport.info_requests.load(ordering), baseline + 3);
}

// ============================================================================
// Timeout-driven Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn consecutive_poll_failures_force_a_reconnect() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();

    let transport = f.factory.latest();
    transport.script_status_requests(&[
        Scripted::HardFail,
        Scripted::HardFail,
        Scripted::HardFail,
    ]);

    for _ in 0..3 {
        f.coordinator.refresh().await.unwrap();
    }

    // Let the scheduled reconnect run through its cool-down.
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(f.factory.created_count(), 2);
    let rebuilt = f.factory.latest();
    assert!(rebuilt.is_connected());
    assert_eq!(rebuilt.subscribed.lock().len(), 1);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn shutdown_disconnects_the_session() {
    let f = fixture();
    f.coordinator.refresh().await.unwrap();

    f.coordinator.shutdown().await;

    assert!(!f.factory.latest().is_connected());
    assert!(
        f.coordinator
            .connection_diagnostics()
            .await
            .connected_since
            .is_none()
    );
}

#[tokio::test]
async fn performance_stats_track_refreshes() {
    let f = fixture();
    assert_eq!(f.coordinator.performance_stats().update_count, 0);

    f.coordinator.refresh().await.unwrap();
    f.coordinator.refresh().await.unwrap();

    let stats = f.coordinator.performance_stats();
    assert_eq!(stats.update_count, 2);
    assert!(stats.total_time >= stats.slowest_time);
}
