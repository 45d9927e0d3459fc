// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reservation schedule entries.

use serde::{Deserialize, Serialize};

/// One entry in the device's weekly reservation schedule.
///
/// `week_days` is a bitmask with Sunday as bit 0 through Saturday as
/// bit 6, matching the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Days of the week this entry applies to (bitmask, Sunday = bit 0).
    pub week_days: u8,
    /// Start hour, 0-23.
    pub hour: u8,
    /// Start minute, 0-59.
    pub minute: u8,
    /// Target temperature for the window, °F. `None` keeps the current
    /// setting.
    #[serde(default)]
    pub dhw_temperature: Option<f64>,
}

impl Reservation {
    /// Creates an entry active every day of the week.
    #[must_use]
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self {
            week_days: 0b0111_1111,
            hour,
            minute,
            dhw_temperature: None,
        }
    }

    /// Returns `true` if the entry applies on the given weekday
    /// (0 = Sunday .. 6 = Saturday).
    #[must_use]
    pub fn applies_on(&self, weekday: u8) -> bool {
        weekday < 7 && self.week_days & (1 << weekday) != 0
    }
}
