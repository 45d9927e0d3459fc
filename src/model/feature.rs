// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device capability and firmware descriptor.

use serde::{Deserialize, Serialize};

/// Capability snapshot for one device.
///
/// Arrives on its own push channel at a much lower cadence than
/// [`DeviceStatus`](super::DeviceStatus) and is replaced independently of
/// it; the two are deliberately not coupled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFeature {
    /// Controller board serial number.
    pub controller_serial_number: Option<String>,
    /// Controller firmware version.
    pub controller_sw_version: Option<u32>,
    /// Controller firmware code.
    pub controller_sw_code: Option<u32>,
    /// Front panel firmware version.
    pub panel_sw_version: Option<u32>,
    /// Front panel firmware code.
    pub panel_sw_code: Option<u32>,
    /// WiFi module firmware version.
    pub wifi_sw_version: Option<u32>,
    /// WiFi module firmware code.
    pub wifi_sw_code: Option<u32>,
    /// Recirculation module firmware version, when fitted.
    pub recirc_sw_version: Option<u32>,
    /// Tank volume code (maps to gallons per the vendor table).
    pub volume_code: Option<u8>,
    /// Lowest settable target temperature, °F.
    pub dhw_temperature_min: Option<f64>,
    /// Highest settable target temperature, °F.
    pub dhw_temperature_max: Option<f64>,
}

impl DeviceFeature {
    /// Returns the supported target temperature range, when reported.
    #[must_use]
    pub fn temperature_range(&self) -> Option<(f64, f64)> {
        match (self.dhw_temperature_min, self.dhw_temperature_max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }
}
