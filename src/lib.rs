// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `NavLink` Lib - A Rust library for Navien NWP500 heat pump water heaters.
//!
//! This library talks to the vendor's NaviLink cloud service: it
//! authenticates the account, discovers registered devices, opens a
//! persistent MQTT session for telemetry pushes, and keeps one
//! authoritative per-device state snapshot that merges polling with
//! asynchronously arriving push updates.
//!
//! # Supported Features
//!
//! - **Device discovery**: account sign-in, token refresh, device list
//! - **Live telemetry**: push status and capability updates over MQTT
//! - **Control**: power, target temperature, operation mode, time-of-use,
//!   sanitization, reservation schedules
//! - **Resilience**: idempotent teardown, guarded forced reconnection,
//!   queued-command classification during session recovery
//! - **Diagnostics**: connection history, request/response telemetry,
//!   refresh performance counters
//!
//! # Quick Start
//!
//! ```no_run
//! use navlink_lib::config::AccountConfig;
//! use navlink_lib::coordinator::{SyncEvent, UpdateCoordinator};
//! use navlink_lib::command::ControlCommand;
//!
//! #[tokio::main]
//! async fn main() -> navlink_lib::Result<()> {
//!     let config = AccountConfig::new("user@example.com", "password");
//!     let coordinator = UpdateCoordinator::for_account(&config);
//!
//!     // First refresh authenticates, discovers devices, and opens the
//!     // push session; later refreshes only trigger status requests.
//!     coordinator.refresh().await?;
//!
//!     // React to pushed updates.
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let SyncEvent::StatusUpdated { mac } = event {
//!                 println!("fresh status for {mac}");
//!             }
//!         }
//!     });
//!
//!     // Send a command to the first device.
//!     if let Some(device) = coordinator.devices().await.first() {
//!         let outcome = coordinator
//!             .send_control_command(
//!                 &device.mac_address,
//!                 &ControlCommand::SetTemperature { temperature: 125.0 },
//!             )
//!             .await;
//!         assert!(outcome.is_success());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Three cooperating components form the synchronization core:
//!
//! - [`manager::ConnectionManager`] owns the single push session: setup,
//!   teardown, per-device subscriptions, and command dispatch with
//!   soft/hard failure classification.
//! - [`coordinator::UpdateCoordinator`] is the single source of truth for
//!   per-device state and the consumer-facing surface.
//! - [`bridge::EventBridge`] marshals transport callbacks from their own
//!   execution context onto the scheduler that owns the state.

pub mod bridge;
pub mod cloud;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod model;
pub mod transport;
pub mod types;

pub use command::ControlCommand;
pub use config::AccountConfig;
pub use coordinator::{DeviceEntry, SyncEvent, UpdateCoordinator};
pub use error::{ApiError, AuthError, CommandError, Error, ParseError, Result, TransportError};
pub use manager::{ConnectionDiagnostics, ConnectionManager, ConnectionState};
pub use model::{Device, DeviceFeature, DeviceStatus, Reservation};
pub use types::{DhwOperationSetting, MacAddress, OperationMode, Outcome};
