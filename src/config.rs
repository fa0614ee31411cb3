//! GAP configuration parameters
//!
//! Everything the application decides about the peripheral before
//! [`Gap::init`](crate::gap::Gap::init): advertised name and service,
//! pairing behaviour, acceptable connection interval and the internal
//! timings.  Loaded from JSON or built in code; immutable after init.

use core::time::Duration;

use heapless::String;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::ports::IoCapability;
use crate::error::ConfigError;

/// Capacity of the device-name characteristic, in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// BLE-legal connection interval bounds (1.25 ms units).
pub const CONN_INTERVAL_MIN: u16 = 0x0006;
pub const CONN_INTERVAL_MAX: u16 = 0x0C80;

/// Window of fast advertising before dropping to the low-power interval.
pub const FAST_ADV_WINDOW_MS: u32 = 60_000;
/// Pause after a disconnect before advertising is restarted.
pub const DISCONNECT_SETTLE_US: u32 = 666 + 666;

/// How the peripheral pairs with a central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingMethod {
    /// Display a PIN the user types on the central.
    PinCodeShow,
    /// Display a value the user confirms on both sides.
    PinCodeVerifyYesNo,
    /// "Just Works": no user interaction, no MITM protection.
    None,
}

/// Service UUID placed in the advertising payload.
///
/// Multi-byte values are serialised little-endian on air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceUuid {
    Uuid16(u16),
    Uuid32(u32),
    /// Little-endian byte order, as transmitted.
    Uuid128([u8; 16]),
}

/// Connection interval range the peripheral accepts (1.25 ms units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnIntervalRange {
    pub min: u16,
    pub max: u16,
}

impl ConnIntervalRange {
    pub fn contains(&self, interval: u16) -> bool {
        (self.min..=self.max).contains(&interval)
    }
}

/// Internal timings.  The defaults match the controller's expectations;
/// tests shorten them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapTimings {
    #[serde(default = "default_fast_adv_window_ms")]
    pub fast_adv_window_ms: u32,
    #[serde(default = "default_settle_us")]
    pub disconnect_settle_us: u32,
}

fn default_fast_adv_window_ms() -> u32 {
    FAST_ADV_WINDOW_MS
}

fn default_settle_us() -> u32 {
    DISCONNECT_SETTLE_US
}

impl GapTimings {
    pub fn fast_adv_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.fast_adv_window_ms))
    }

    pub fn disconnect_settle(&self) -> Duration {
        Duration::from_micros(u64::from(self.disconnect_settle_us))
    }
}

impl Default for GapTimings {
    fn default() -> Self {
        Self {
            fast_adv_window_ms: FAST_ADV_WINDOW_MS,
            disconnect_settle_us: DISCONNECT_SETTLE_US,
        }
    }
}

/// Peripheral configuration handed to [`Gap::init`](crate::gap::Gap::init).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapConfig {
    // --- Identity ---
    /// Advertised local name (without AD prefix)
    pub name: String<MAX_NAME_LEN>,
    /// Public device address, least-significant byte first
    pub mac_address: [u8; 6],
    /// GAP appearance characteristic value
    pub appearance: u16,
    /// Service UUID listed in the advertising payload
    pub adv_service_uuid: ServiceUuid,

    // --- Security ---
    pub pairing_method: PairingMethod,
    pub bonding: bool,
    #[serde(default = "default_true")]
    pub mitm_protection: bool,
    #[serde(default)]
    pub fixed_pin: bool,
    /// Mask generated pass keys in the log
    #[serde(default)]
    pub hide_pin_in_logs: bool,

    // --- Connection ---
    pub conn_interval: ConnIntervalRange,

    // --- Timing ---
    #[serde(default)]
    pub timings: GapTimings,
}

fn default_true() -> bool {
    true
}

impl Default for GapConfig {
    fn default() -> Self {
        let mut name = String::new();
        // Fits: literal is shorter than MAX_NAME_LEN.
        let _ = name.push_str("GAP Peripheral");
        Self {
            name,
            mac_address: [0xFE, 0xCA, 0xEF, 0xBE, 0xAD, 0xDE],
            appearance: 0x0000,
            adv_service_uuid: ServiceUuid::Uuid16(0x3080),
            pairing_method: PairingMethod::PinCodeShow,
            bonding: true,
            mitm_protection: true,
            fixed_pin: false,
            hide_pin_in_logs: false,
            conn_interval: ConnIntervalRange {
                min: 0x06, // 7.5 ms
                max: 0x24, // 45 ms
            },
            timings: GapTimings::default(),
        }
    }
}

impl GapConfig {
    /// Default configuration advertising `name`.
    pub fn named(name: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.name.clear();
        config
            .name
            .push_str(name)
            .map_err(|()| ConfigError::NameTooLong)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            warn!("GAP: config rejected: {e}");
            ConfigError::Malformed
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let range = &self.conn_interval;
        if range.min > range.max
            || range.min < CONN_INTERVAL_MIN
            || range.max > CONN_INTERVAL_MAX
        {
            return Err(ConfigError::IntervalRange);
        }
        Ok(())
    }
}

// ── Security policy ──────────────────────────────────────────

/// Pairing parameters derived once from the config at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub io_capability: IoCapability,
    pub mitm: bool,
    pub fixed_pin: bool,
    pub bonding: bool,
    pub keypress_notification: bool,
}

impl SecurityPolicy {
    pub fn from_config(config: &GapConfig) -> Self {
        match config.pairing_method {
            PairingMethod::PinCodeShow => Self {
                io_capability: IoCapability::DisplayOnly,
                mitm: config.mitm_protection,
                fixed_pin: config.fixed_pin,
                bonding: config.bonding,
                keypress_notification: false,
            },
            PairingMethod::PinCodeVerifyYesNo => Self {
                io_capability: IoCapability::DisplayYesNo,
                mitm: config.mitm_protection,
                fixed_pin: config.fixed_pin,
                bonding: config.bonding,
                keypress_notification: true,
            },
            // Some centrals refuse Just Works; DisplayYesNo lets them fall
            // back to numeric comparison.
            PairingMethod::None => Self {
                io_capability: IoCapability::DisplayYesNo,
                mitm: false,
                fixed_pin: false,
                bonding: false,
                keypress_notification: true,
            },
        }
    }
}
