// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Immutable device identity record.

use serde::{Deserialize, Serialize};

use crate::types::MacAddress;

/// A device registered on the account.
///
/// Built once from the cloud device list at discovery time and never
/// mutated afterward. Everything that changes over time lives in the
/// coordinator's per-device entry, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Hardware address, the key for all per-device state.
    pub mac_address: MacAddress,
    /// Display name the user assigned in the vendor app.
    pub name: String,
    /// Device type code (52 for NWP500 water heaters).
    pub device_type: u8,
    /// Model string reported by the cloud.
    pub model: String,
    /// Installation city, if the user filled it in.
    #[serde(default)]
    pub city: Option<String>,
    /// Installation state/region, if the user filled it in.
    #[serde(default)]
    pub state: Option<String>,
}

impl Device {
    /// Creates a device record.
    #[must_use]
    pub fn new(
        mac_address: MacAddress,
        name: impl Into<String>,
        device_type: u8,
        model: impl Into<String>,
    ) -> Self {
        Self {
            mac_address,
            name: name.into(),
            device_type,
            model: model.into(),
            city: None,
            state: None,
        }
    }
}
