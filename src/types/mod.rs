// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core value types shared across the library.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware address identifying a device on the account.
///
/// The NaviLink cloud keys every device by its MAC address. This newtype
/// normalizes the address to lowercase so the same device always hashes to
/// the same entry, regardless of how the cloud happened to format it.
///
/// # Examples
///
/// ```
/// use navlink_lib::types::MacAddress;
///
/// let mac = MacAddress::new("04:78:63:AA:BB:CC");
/// assert_eq!(mac.as_str(), "04:78:63:aa:bb:cc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(String);

impl MacAddress {
    /// Creates a normalized MAC address.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    /// Returns the normalized address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MacAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Result of dispatching an operation to the push transport.
///
/// `Queued` covers the clean-session reconnection case: the session has
/// accepted the request and will resubmit it once reconnected. Callers
/// that only care about "did the command go somewhere" should use
/// [`Outcome::is_success`], which counts `Queued` as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation was sent over the live session.
    Sent,
    /// The operation is queued and will be retried by the session.
    Queued,
    /// The operation failed.
    Failed,
}

impl Outcome {
    /// Returns `true` unless the operation failed outright.
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Current operation mode reported by the heat pump.
///
/// The wire format carries these as raw mode codes; unknown codes from
/// newer firmware deserialize fine and simply map to `None` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Unit is idle.
    Standby,
    /// Heat pump compressor only.
    HeatPump,
    /// Hybrid mode favoring efficiency.
    HybridEfficiency,
    /// Hybrid mode favoring recovery speed.
    HybridBoost,
}

impl OperationMode {
    /// Maps a raw mode code to a known operation mode.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Standby),
            32 => Some(Self::HeatPump),
            64 => Some(Self::HybridEfficiency),
            96 => Some(Self::HybridBoost),
            _ => None,
        }
    }

    /// Returns the raw mode code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Standby => 0,
            Self::HeatPump => 32,
            Self::HybridEfficiency => 64,
            Self::HybridBoost => 96,
        }
    }
}

/// Domestic-hot-water operation setting selected by the user.
///
/// Distinct from [`OperationMode`]: the setting is what was requested, the
/// mode is what the machine is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhwOperationSetting {
    /// Heat pump only.
    HeatPump,
    /// Electric resistance elements only.
    Electric,
    /// Energy saver (hybrid, efficiency biased).
    EnergySaver,
    /// High demand (hybrid, speed biased).
    HighDemand,
    /// Vacation mode.
    Vacation,
    /// Unit powered off.
    PowerOff,
}

impl DhwOperationSetting {
    /// Maps a raw setting code to a known setting.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::HeatPump),
            2 => Some(Self::Electric),
            3 => Some(Self::EnergySaver),
            4 => Some(Self::HighDemand),
            5 => Some(Self::Vacation),
            6 => Some(Self::PowerOff),
            _ => None,
        }
    }

    /// Returns the raw setting code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::HeatPump => 1,
            Self::Electric => 2,
            Self::EnergySaver => 3,
            Self::HighDemand => 4,
            Self::Vacation => 5,
            Self::PowerOff => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_normalizes() {
        let mac = MacAddress::new("  04:78:63:AA:BB:CC ");
        assert_eq!(mac.as_str(), "04:78:63:aa:bb:cc");
        assert_eq!(mac, MacAddress::new("04:78:63:aa:bb:cc"));
    }

    #[test]
    fn mac_address_hashes_consistently() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(MacAddress::new("AA:BB:CC:00:11:22"));
        assert!(set.contains(&MacAddress::new("aa:bb:cc:00:11:22")));
    }

    #[test]
    fn outcome_success_classification() {
        assert!(Outcome::Sent.is_success());
        assert!(Outcome::Queued.is_success());
        assert!(!Outcome::Failed.is_success());
    }

    #[test]
    fn operation_mode_round_trip() {
        for mode in [
            OperationMode::Standby,
            OperationMode::HeatPump,
            OperationMode::HybridEfficiency,
            OperationMode::HybridBoost,
        ] {
            assert_eq!(OperationMode::from_code(mode.code()), Some(mode));
        }
    }

    #[test]
    fn operation_mode_unknown_code() {
        assert_eq!(OperationMode::from_code(17), None);
    }

    #[test]
    fn dhw_setting_round_trip() {
        for setting in [
            DhwOperationSetting::HeatPump,
            DhwOperationSetting::Electric,
            DhwOperationSetting::EnergySaver,
            DhwOperationSetting::HighDemand,
            DhwOperationSetting::Vacation,
            DhwOperationSetting::PowerOff,
        ] {
            assert_eq!(
                DhwOperationSetting::from_code(setting.code()),
                Some(setting)
            );
        }
    }

    #[test]
    fn dhw_setting_zero_is_unknown() {
        assert_eq!(DhwOperationSetting::from_code(0), None);
    }
}
