//! Unified error types for the GAP manager.
//!
//! A single `GapError` enum that every fallible public operation returns.
//! All variants are `Copy` so they can be passed through the worker and
//! translator paths without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level GAP error
// ---------------------------------------------------------------------------

/// Every fallible public GAP operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapError {
    /// The controller reported that the radio stack is not ready.
    RadioNotReady,
    /// Configuration is invalid.
    Config(ConfigError),
    /// The command queue is full. Producers are bounded, so this is an
    /// invariant violation rather than back-pressure.
    QueueFull,
    /// The worker or timer thread could not be created.
    ThreadSpawn,
    /// The instance has already been shut down.
    ShutDown,
}

impl fmt::Display for GapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RadioNotReady => write!(f, "radio stack not ready"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::QueueFull => write!(f, "command queue full"),
            Self::ThreadSpawn => write!(f, "thread spawn failed"),
            Self::ShutDown => write!(f, "GAP already shut down"),
        }
    }
}

impl std::error::Error for GapError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Advertised name is empty.
    EmptyName,
    /// Advertised name exceeds the device-name characteristic capacity.
    NameTooLong,
    /// Connection interval bounds are inverted or outside 6..=3200.
    IntervalRange,
    /// Name and service UUID cannot share one advertising payload.
    AdvertisingDataTooLong,
    /// Serialised configuration could not be parsed.
    Malformed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "advertised name is empty"),
            Self::NameTooLong => write!(f, "advertised name too long"),
            Self::IntervalRange => write!(f, "connection interval range invalid"),
            Self::AdvertisingDataTooLong => write!(f, "advertising data exceeds 31 bytes"),
            Self::Malformed => write!(f, "malformed configuration"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for GapError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Controller status
// ---------------------------------------------------------------------------

/// Non-zero status byte returned by a controller command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus(pub u8);

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status 0x{:02X}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, GapError>;
