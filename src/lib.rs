//! BLE peripheral GAP manager.
//!
//! Drives a BLE controller through advertising, connection supervision and
//! pairing, and reports the outcome to the application through a single
//! event callback.  The controller sits behind the
//! [`Controller`](app::ports::Controller) port; the crate ships a logging
//! simulation for host builds.  ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod gap;
pub mod hci;
pub mod identity;
pub mod timer;
pub mod translator;
pub mod worker;

mod esp_link_shims;

// Links the embassy-time driver that async-io-mini's timers sleep on.
use embassy_time as _;

pub use app::events::GapEvent;
pub use app::ports::{Controller, GapEventHandler};
pub use config::{GapConfig, PairingMethod, ServiceUuid};
pub use error::{GapError, Result};
pub use fsm::GapState;
pub use fsm::context::RemoteRssi;
pub use gap::Gap;
