// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device telemetry snapshot.

use serde::{Deserialize, Serialize};

use crate::types::{DhwOperationSetting, OperationMode};

/// Full telemetry snapshot for one device.
///
/// The cloud pushes these wholesale; a snapshot is replaced as a unit, never
/// merged field-by-field, so a consumer always reads values from a single
/// point in time. All fields are optional because individual firmware
/// revisions omit fields they don't support.
///
/// Mode fields keep the raw wire codes (`operation_mode`,
/// `dhw_operation_setting`); unknown codes from newer firmware still
/// deserialize, and [`DeviceStatus::operation_mode`] /
/// [`DeviceStatus::dhw_setting`] expose the typed view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceStatus {
    /// Temperature at the top of the tank, °F.
    pub tank_upper_temperature: Option<f64>,
    /// Temperature at the bottom of the tank, °F.
    pub tank_lower_temperature: Option<f64>,
    /// Compressor discharge temperature, °F.
    pub discharge_temperature: Option<f64>,
    /// Compressor suction temperature, °F.
    pub suction_temperature: Option<f64>,
    /// Evaporator temperature, °F.
    pub evaporator_temperature: Option<f64>,
    /// Ambient temperature at the unit, °F.
    pub ambient_temperature: Option<f64>,
    /// Outside temperature, °F.
    pub outside_temperature: Option<f64>,
    /// Inlet water temperature, °F.
    pub current_inlet_temperature: Option<f64>,
    /// Delivered hot water temperature, °F.
    pub dhw_temperature: Option<f64>,
    /// Configured target temperature, °F.
    pub dhw_temperature_setting: Option<f64>,
    /// Effective target temperature after schedule overrides, °F.
    pub dhw_target_temperature_setting: Option<f64>,
    /// Tank charge level, percent.
    pub dhw_charge_per: Option<f64>,
    /// Instantaneous power draw, W.
    pub current_inst_power: Option<f64>,
    /// Current hot water flow rate, gpm.
    pub current_dhw_flow_rate: Option<f64>,
    /// Lifetime hot water flow, gallons.
    pub cumulated_dhw_flow_rate: Option<f64>,
    /// Target evaporator fan speed, rpm.
    pub target_fan_rpm: Option<u16>,
    /// Current evaporator fan speed, rpm.
    pub current_fan_rpm: Option<u16>,
    /// Electronic expansion valve position, steps.
    pub eev_step: Option<u16>,
    /// WiFi signal strength, dBm.
    pub wifi_rssi: Option<i16>,
    /// Active error code, zero when healthy.
    pub error_code: Option<u16>,
    /// Active sub error code.
    pub sub_error_code: Option<u16>,
    /// Raw current operation mode code.
    pub operation_mode: Option<u8>,
    /// Raw DHW operation setting code.
    pub dhw_operation_setting: Option<u8>,
    /// Whether hot water production is active.
    pub dhw_use: Option<bool>,
    /// Whether the compressor is running.
    pub comp_use: Option<bool>,
    /// Whether the upper electric element is energized.
    pub heat_upper_use: Option<bool>,
    /// Whether the lower electric element is energized.
    pub heat_lower_use: Option<bool>,
    /// Whether eco mode is active.
    pub eco_use: Option<bool>,
    /// Whether periodic sanitization is enabled.
    pub anti_legionella_use: Option<bool>,
    /// Sanitization period, days.
    pub anti_legionella_period: Option<u8>,
    /// Whether a sanitization cycle is currently running.
    pub anti_legionella_operation_busy: Option<bool>,
    /// Whether the reservation program is enabled.
    pub program_reservation_use: Option<bool>,
    /// Whether a time-of-use override is active.
    pub tou_override_status: Option<bool>,
    /// Configured vacation length, days.
    pub vacation_day_setting: Option<u16>,
    /// Elapsed vacation days.
    pub vacation_day_elapsed: Option<u16>,
    /// Whether freeze protection is active.
    pub freeze_protection_use: Option<bool>,
    /// Total thermal energy capacity, Wh.
    pub total_energy_capacity: Option<f64>,
    /// Currently available thermal energy, Wh.
    pub available_energy_capacity: Option<f64>,
}

impl DeviceStatus {
    /// Typed view of the raw operation mode code.
    #[must_use]
    pub fn operation_mode(&self) -> Option<OperationMode> {
        self.operation_mode.and_then(OperationMode::from_code)
    }

    /// Typed view of the raw DHW operation setting code.
    #[must_use]
    pub fn dhw_setting(&self) -> Option<DhwOperationSetting> {
        self.dhw_operation_setting
            .and_then(DhwOperationSetting::from_code)
    }

    /// Returns `true` if the device reports an active fault.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error_code.is_some_and(|code| code != 0)
    }

    /// Returns `true` if any heat source is currently running.
    #[must_use]
    pub fn is_heating(&self) -> bool {
        [self.comp_use, self.heat_upper_use, self.heat_lower_use]
            .iter()
            .any(|flag| flag.unwrap_or(false))
    }
}
