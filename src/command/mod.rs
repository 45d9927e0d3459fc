// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Control commands accepted by the device.
//!
//! Commands are a fixed, typed set; the stringly service surface used by
//! automation consumers goes through [`ControlCommand::parse`], where an
//! unknown name is a handled error rather than a panic.

use serde_json::{Value, json};

use crate::error::CommandError;
use crate::model::Reservation;

/// A control command for one device.
///
/// # Examples
///
/// ```
/// use navlink_lib::command::ControlCommand;
///
/// let cmd = ControlCommand::SetTemperature { temperature: 125.0 };
/// assert_eq!(cmd.name(), "set_temperature");
/// assert_eq!(cmd.payload()["dhw_temperature_setting"], 125.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Turn the unit on or off.
    SetPower {
        /// `true` to power on.
        power_on: bool,
    },
    /// Set the target hot water temperature, °F.
    SetTemperature {
        /// Target temperature.
        temperature: f64,
    },
    /// Select a DHW operation setting by raw mode code.
    SetDhwMode {
        /// The raw setting code (see
        /// [`DhwOperationSetting`](crate::types::DhwOperationSetting)).
        mode: u8,
    },
    /// Enable or disable time-of-use scheduling.
    SetTouEnabled {
        /// `true` to enable.
        enabled: bool,
    },
    /// Enable periodic tank sanitization.
    EnableAntiLegionella {
        /// Days between sanitization cycles.
        period_days: u8,
    },
    /// Disable periodic tank sanitization.
    DisableAntiLegionella,
    /// Replace the reservation schedule.
    UpdateReservations {
        /// The new schedule entries.
        entries: Vec<Reservation>,
        /// Whether the reservation program is enabled.
        enabled: bool,
    },
    /// Ask the device to publish its current reservation schedule.
    RequestReservations,
}

impl ControlCommand {
    /// Returns the stable command name used on the wire and in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetPower { .. } => "set_power",
            Self::SetTemperature { .. } => "set_temperature",
            Self::SetDhwMode { .. } => "set_dhw_mode",
            Self::SetTouEnabled { .. } => "set_tou_enabled",
            Self::EnableAntiLegionella { .. } => "enable_anti_legionella",
            Self::DisableAntiLegionella => "disable_anti_legionella",
            Self::UpdateReservations { .. } => "update_reservations",
            Self::RequestReservations => "request_reservations",
        }
    }

    /// Returns the JSON payload published alongside the command name.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::SetPower { power_on } => json!({ "power": power_on }),
            Self::SetTemperature { temperature } => {
                json!({ "dhw_temperature_setting": temperature })
            }
            Self::SetDhwMode { mode } => json!({ "dhw_operation_setting": mode }),
            Self::SetTouEnabled { enabled } => json!({ "tou_enabled": enabled }),
            Self::EnableAntiLegionella { period_days } => {
                json!({ "anti_legionella_use": true, "anti_legionella_period": period_days })
            }
            Self::DisableAntiLegionella => json!({ "anti_legionella_use": false }),
            Self::UpdateReservations { entries, enabled } => {
                json!({ "reservations": entries, "program_reservation_use": enabled })
            }
            Self::RequestReservations => json!({ "request": "reservations" }),
        }
    }

    /// Builds a command from a name and loosely typed parameters.
    ///
    /// Defaults match the device's own behavior: `set_power` defaults to
    /// on, `set_tou_enabled` to enabled, `enable_anti_legionella` to a
    /// 14-day period.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownCommand`] for names outside the
    /// command set and [`CommandError::MissingParameter`] /
    /// [`CommandError::InvalidParameter`] for bad arguments.
    pub fn parse(name: &str, params: &Value) -> Result<Self, CommandError> {
        match name {
            "set_power" => Ok(Self::SetPower {
                power_on: bool_param(params, "power_on").unwrap_or(true),
            }),
            "set_temperature" => {
                let temperature = params
                    .get("temperature")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| CommandError::MissingParameter {
                        command: name.to_string(),
                        parameter: "temperature".to_string(),
                    })?;
                Ok(Self::SetTemperature { temperature })
            }
            "set_dhw_mode" => {
                let mode = params.get("mode").and_then(Value::as_u64).ok_or_else(|| {
                    CommandError::MissingParameter {
                        command: name.to_string(),
                        parameter: "mode".to_string(),
                    }
                })?;
                let mode = u8::try_from(mode).map_err(|_| CommandError::InvalidParameter {
                    parameter: "mode".to_string(),
                    message: format!("{mode} is out of range"),
                })?;
                Ok(Self::SetDhwMode { mode })
            }
            "set_tou_enabled" => Ok(Self::SetTouEnabled {
                enabled: bool_param(params, "enabled").unwrap_or(true),
            }),
            "enable_anti_legionella" => {
                let period_days = match params.get("period_days") {
                    None | Some(Value::Null) => 14,
                    Some(value) => value
                        .as_u64()
                        .and_then(|days| u8::try_from(days).ok())
                        .ok_or_else(|| CommandError::InvalidParameter {
                            parameter: "period_days".to_string(),
                            message: format!("{value} is not a valid day count"),
                        })?,
                };
                Ok(Self::EnableAntiLegionella { period_days })
            }
            "disable_anti_legionella" => Ok(Self::DisableAntiLegionella),
            "update_reservations" => {
                let entries = match params.get("reservations") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                        CommandError::InvalidParameter {
                            parameter: "reservations".to_string(),
                            message: e.to_string(),
                        }
                    })?,
                };
                Ok(Self::UpdateReservations {
                    entries,
                    enabled: bool_param(params, "enabled").unwrap_or(true),
                })
            }
            "request_reservations" => Ok(Self::RequestReservations),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

fn bool_param(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}
