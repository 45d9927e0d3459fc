// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account configuration for the synchronization core.

use std::time::Duration;

use crate::cloud::AuthTokens;

/// Default polling interval for coordinator status triggers.
///
/// 30 seconds balances data freshness against cloud load. Consumers can
/// configure anything in the 10-300 second range.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum allowed scan interval.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum allowed scan interval.
pub const MAX_SCAN_INTERVAL: Duration = Duration::from_secs(300);

/// Device type code the cloud uses for NWP500 heat pump water heaters.
pub const DEVICE_TYPE_WATER_HEATER: u8 = 52;

/// Default NaviLink REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://nlus.naviensmartcontrol.com/api/v2.1";

/// Default NaviLink MQTT broker URL.
pub const DEFAULT_MQTT_URL: &str = "mqtts://mqtt.naviensmartcontrol.com:8883";

/// Configuration for one NaviLink account.
///
/// One coordinator is constructed per account; all tunables flow in
/// through this struct rather than process-global state.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use navlink_lib::config::AccountConfig;
///
/// let config = AccountConfig::new("user@example.com", "hunter2")
///     .with_scan_interval(Duration::from_secs(60));
/// assert_eq!(config.scan_interval, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Interval between coordinator poll triggers (clamped to 10-300 s).
    pub scan_interval: Duration,
    /// Interval for transport-owned periodic status requests.
    pub status_request_interval: Duration,
    /// Interval for transport-owned periodic device info requests.
    pub info_request_interval: Duration,
    /// Cool-down between teardown and re-setup during a forced reconnect.
    pub reconnect_cooldown: Duration,
    /// Base URL of the REST API.
    pub api_base_url: String,
    /// URL of the MQTT broker.
    pub mqtt_url: String,
    /// Previously persisted tokens, if the caller stored any.
    ///
    /// A valid stored token skips the initial sign-in round-trip.
    pub stored_tokens: Option<AuthTokens>,
}

impl AccountConfig {
    /// Creates a configuration with default intervals and endpoints.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            status_request_interval: Duration::from_secs(300),
            info_request_interval: Duration::from_secs(1800),
            reconnect_cooldown: Duration::from_secs(2),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            mqtt_url: DEFAULT_MQTT_URL.to_string(),
            stored_tokens: None,
        }
    }

    /// Sets the coordinator scan interval, clamped to the supported range.
    #[must_use]
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval.clamp(MIN_SCAN_INTERVAL, MAX_SCAN_INTERVAL);
        self
    }

    /// Sets the REST API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Sets the MQTT broker URL.
    #[must_use]
    pub fn with_mqtt_url(mut self, url: impl Into<String>) -> Self {
        self.mqtt_url = url.into();
        self
    }

    /// Supplies tokens persisted from a previous session.
    #[must_use]
    pub fn with_stored_tokens(mut self, tokens: AuthTokens) -> Self {
        self.stored_tokens = Some(tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AccountConfig::new("user@example.com", "secret");

        assert_eq!(config.scan_interval, DEFAULT_SCAN_INTERVAL);
        assert_eq!(config.status_request_interval, Duration::from_secs(300));
        assert_eq!(config.info_request_interval, Duration::from_secs(1800));
        assert!(config.stored_tokens.is_none());
    }

    #[test]
    fn scan_interval_clamped_low() {
        let config = AccountConfig::new("a", "b").with_scan_interval(Duration::from_secs(1));
        assert_eq!(config.scan_interval, MIN_SCAN_INTERVAL);
    }

    #[test]
    fn scan_interval_clamped_high() {
        let config = AccountConfig::new("a", "b").with_scan_interval(Duration::from_secs(3600));
        assert_eq!(config.scan_interval, MAX_SCAN_INTERVAL);
    }

    #[test]
    fn scan_interval_in_range_kept() {
        let config = AccountConfig::new("a", "b").with_scan_interval(Duration::from_secs(45));
        assert_eq!(config.scan_interval, Duration::from_secs(45));
    }
}
