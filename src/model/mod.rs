// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data model: device identity, telemetry snapshots, and capability
//! descriptors as reported by the NaviLink cloud.

mod device;
mod feature;
mod reservation;
mod status;

pub use device::Device;
pub use feature::DeviceFeature;
pub use reservation::Reservation;
pub use status::DeviceStatus;
