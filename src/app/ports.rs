//! Port traits: the boundary between the GAP core and the outside world.
//!
//! ```text
//!   Application ◀── GapEventHandler ◀── Gap (domain) ──▶ Controller ──▶ radio
//! ```
//!
//! The [`Controller`] trait is the command half of the controller
//! transport: one method per command the GAP core issues.  Events travel
//! the other way through [`crate::gap::Gap::notify`].  Implementations are
//! expected to be non-blocking: every method is called with the GAP state
//! lock held.
//!
//! The [`GapEventHandler`] is the application callback.  It is never
//! invoked with the state lock held, so it may query the [`Gap`] freely.
//!
//! [`Gap`]: crate::gap::Gap

use crate::error::ControllerStatus;

use super::events::GapEvent;

/// Result of a single controller command.
pub type ControllerResult<T = ()> = Result<T, ControllerStatus>;

// ───────────────────────────────────────────────────────────────
// Command parameter types
// ───────────────────────────────────────────────────────────────

/// Disconnect reason codes used by the GAP core.
pub mod reason {
    /// Authentication failure (pairing rejected).
    pub const AUTHENTICATION_FAILURE: u8 = 0x05;
    /// Remote user terminated connection.
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;
}

/// I/O capability advertised during pairing feature exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoCapability {
    DisplayOnly = 0x00,
    DisplayYesNo = 0x01,
    KeyboardOnly = 0x02,
    NoInputNoOutput = 0x03,
    KeyboardDisplay = 0x04,
}

/// Address type used for our own advertising and identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OwnAddressType {
    Public = 0x00,
    StaticRandom = 0x01,
}

/// Advertising PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdvertisingType {
    /// ADV_IND: connectable, scannable, undirected.
    ConnectableUndirected = 0x00,
}

/// LE Secure Connections support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecureConnections {
    NotSupported = 0x00,
    Optional = 0x01,
    Mandatory = 0x02,
}

/// A block of controller configuration data, written once at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigData {
    PublicAddress([u8; 6]),
    StaticRandomAddress([u8; 6]),
    /// Identity root key used to derive LTK and CSRK.
    IdentityRootKey([u8; 16]),
    /// Encryption root key used to derive LTK and CSRK.
    EncryptionRootKey([u8; 16]),
}

impl ConfigData {
    /// Offset of this block in the controller's configuration area.
    pub const fn offset(&self) -> u8 {
        match self {
            Self::PublicAddress(_) => 0x00,
            Self::EncryptionRootKey(_) => 0x08,
            Self::IdentityRootKey(_) => 0x18,
            Self::StaticRandomAddress(_) => 0x2E,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::PublicAddress(a) | Self::StaticRandomAddress(a) => a,
            Self::IdentityRootKey(k) | Self::EncryptionRootKey(k) => k,
        }
    }
}

/// Parameters of a "set discoverable" command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverableParams<'a> {
    pub adv_type: AdvertisingType,
    /// Minimum advertising interval (0.625 ms units).
    pub interval_min: u16,
    /// Maximum advertising interval (0.625 ms units).
    pub interval_max: u16,
    pub own_address: OwnAddressType,
    /// Local name AD structure payload, AD type byte first.
    pub local_name: &'a [u8],
    /// Service UUID AD structure payload, AD type byte first.
    pub service_uuids: &'a [u8],
}

/// Parameters of a "set authentication requirement" command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRequirement {
    pub bonding: bool,
    pub mitm: bool,
    pub secure_connections: SecureConnections,
    pub keypress_notification: bool,
    pub min_encryption_key_size: u8,
    pub max_encryption_key_size: u8,
    pub use_fixed_pin: bool,
    pub fixed_pin: u32,
    pub identity_address: OwnAddressType,
}

/// Attribute handles returned by GAP service initialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapServiceHandles {
    pub service: u16,
    pub device_name: u16,
    pub appearance: u16,
}

/// PHY preference masks for "set default PHY".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyPreference {
    /// Bit 0: no TX preference, bit 1: no RX preference.
    pub all_phys: u8,
    pub tx_phys: u8,
    pub rx_phys: u8,
}

impl PhyPreference {
    /// Prefer LE 2M in both directions.
    pub const PREFER_2M: Self = Self {
        all_phys: 0x00,
        tx_phys: 0x02,
        rx_phys: 0x02,
    };
}

// ───────────────────────────────────────────────────────────────
// Controller port (driven adapter: domain → radio controller)
// ───────────────────────────────────────────────────────────────

/// Command interface of the BLE controller.
///
/// Every command returns `Err(ControllerStatus)` for a non-zero status.
/// The GAP core logs failures and carries on; the controller remains the
/// source of truth for what the radio is actually doing.
pub trait Controller: Send {
    /// Whether the radio stack finished its own start-up.
    fn is_radio_ready(&self) -> bool;

    // ── Initialisation ────────────────────────────────────────

    fn write_config_data(&mut self, data: &ConfigData) -> ControllerResult;
    fn set_tx_power(&mut self, enable_high_power: bool, level: u8) -> ControllerResult;
    fn gatt_init(&mut self) -> ControllerResult;
    /// Initialise the GAP layer in the peripheral role.
    fn gap_init(&mut self, device_name_len: u8) -> ControllerResult<GapServiceHandles>;
    fn update_char_value(&mut self, service: u16, characteristic: u16, value: &[u8])
    -> ControllerResult;
    fn set_default_phy(&mut self, preference: PhyPreference) -> ControllerResult;
    fn set_io_capability(&mut self, capability: IoCapability) -> ControllerResult;
    fn set_authentication_requirement(&mut self, requirement: &AuthRequirement) -> ControllerResult;
    fn configure_whitelist(&mut self) -> ControllerResult;

    // ── Advertising ───────────────────────────────────────────

    fn set_discoverable(&mut self, params: &DiscoverableParams<'_>) -> ControllerResult;
    fn set_non_discoverable(&mut self) -> ControllerResult;

    // ── Connection ────────────────────────────────────────────

    fn terminate(&mut self, handle: u16, reason: u8) -> ControllerResult;
    fn connection_parameter_update_request(
        &mut self,
        handle: u16,
        interval_min: u16,
        interval_max: u16,
        slave_latency: u16,
        supervision_timeout: u16,
    ) -> ControllerResult;
    fn read_rssi(&mut self, handle: u16) -> ControllerResult<i8>;
    /// Returns the `(tx, rx)` PHY in use on the link.
    fn read_phy(&mut self, handle: u16) -> ControllerResult<(u8, u8)>;

    // ── Security ──────────────────────────────────────────────

    fn slave_security_request(&mut self, handle: u16) -> ControllerResult;
    fn pass_key_response(&mut self, handle: u16, pass_key: u32) -> ControllerResult;
    fn numeric_comparison_confirm(&mut self, handle: u16, accept: bool) -> ControllerResult;
    fn allow_rebond(&mut self, handle: u16) -> ControllerResult;
}

// ───────────────────────────────────────────────────────────────
// Event handler port (domain → application)
// ───────────────────────────────────────────────────────────────

/// Application callback for [`GapEvent`]s.
///
/// The return value is only meaningful for [`GapEvent::PinCodeVerify`],
/// where `true` accepts the displayed value.  The handler runs on whichever
/// thread produced the event (worker or notification context) and must not
/// block for long: a pending numeric comparison waits on it.
///
/// Calling [`Gap::notify`](crate::gap::Gap::notify),
/// [`Gap::handle_controller_event`](crate::gap::Gap::handle_controller_event)
/// or [`Gap::shutdown`](crate::gap::Gap::shutdown) from inside the handler
/// deadlocks: each waits for the delivery in progress.
pub trait GapEventHandler: Send {
    fn on_event(&mut self, event: GapEvent) -> bool;
}

impl<F> GapEventHandler for F
where
    F: FnMut(GapEvent) -> bool + Send,
{
    fn on_event(&mut self, event: GapEvent) -> bool {
        self(event)
    }
}
