//! Outbound application events.
//!
//! The GAP core delivers these through the
//! [`GapEventHandler`](super::ports::GapEventHandler) port, in the order
//! the state machine produced them.

/// Size of the ATT header subtracted from the MTU to get the payload size.
pub const ATT_HEADER_LEN: u16 = 3;

/// Structured events emitted by the GAP core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEvent {
    /// Advertising started or its interval changed.
    StartAdvertising,
    /// Advertising stopped (also emitted when already idle).
    StopAdvertising,
    /// Pairing completed; the link is ready for use.
    Connected,
    /// The link went down.
    Disconnected,
    /// Show this 6-digit PIN to the user.
    PinCodeShow(u32),
    /// Ask the user whether this value matches the peer's.
    PinCodeVerify(u32),
    /// Usable ATT payload size after MTU exchange.
    MtuNegotiated(u16),
}

impl GapEvent {
    /// Build the MTU event for a negotiated `mtu`.  Saturates at zero for
    /// an MTU smaller than the ATT header.
    pub fn mtu_negotiated(mtu: u16) -> Self {
        Self::MtuNegotiated(mtu.saturating_sub(ATT_HEADER_LEN))
    }
}
