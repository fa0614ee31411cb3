//! Connection bookkeeping owned by the GAP state machine.
//!
//! Everything here is read and written only with the GAP state lock held.
//! Queries copy values out; nothing hands out references past the lock.

use super::GapState;

/// RSSI value meaning "no sample".
pub const RSSI_UNKNOWN: i8 = 127;

// ---------------------------------------------------------------------------
// Connection parameters
// ---------------------------------------------------------------------------

/// Link parameters reported by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// Connection interval (1.25 ms units).
    pub interval: u16,
    pub slave_latency: u16,
    /// Supervision timeout (10 ms units).
    pub supervision_timeout: u16,
}

impl ConnectionParameters {
    /// Connection interval in whole milliseconds.
    pub fn interval_ms(&self) -> u32 {
        u32::from(self.interval) * 5 / 4
    }

    pub fn supervision_timeout_ms(&self) -> u32 {
        u32::from(self.supervision_timeout) * 10
    }
}

// ---------------------------------------------------------------------------
// Connection context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Current link, if any.
    pub handle: Option<u16>,
    pub params: ConnectionParameters,
    /// Cached RSSI in dBm, [`RSSI_UNKNOWN`] until sampled.
    pub rssi: i8,
    /// Clock reading (ms) of the last RSSI sample.
    pub rssi_sampled_at: Option<u32>,
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self {
            handle: None,
            params: ConnectionParameters::default(),
            rssi: RSSI_UNKNOWN,
            rssi_sampled_at: None,
        }
    }
}

impl ConnectionContext {
    /// Forget the link.  Parameters stay for diagnostics.
    pub fn clear(&mut self) {
        self.handle = None;
        self.rssi = RSSI_UNKNOWN;
        self.rssi_sampled_at = None;
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Signal strength of the current link and the age of that reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRssi {
    /// dBm, [`RSSI_UNKNOWN`] when there is no sample.
    pub rssi: i8,
    /// Milliseconds since the sample; 0 when not connected or never
    /// sampled, at least 1 otherwise.
    pub age_ms: u32,
}

impl RemoteRssi {
    pub const NONE: Self = Self {
        rssi: RSSI_UNKNOWN,
        age_ms: 0,
    };

    pub fn is_fresh(&self) -> bool {
        self.age_ms > 0
    }
}

/// Point-in-time view of the GAP core for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapDiagnostics {
    pub state: GapState,
    pub connection_handle: Option<u16>,
    pub params: ConnectionParameters,
    pub rssi: i8,
    /// Last `(tx, rx)` PHY read after a PHY update.
    pub phy: Option<(u8, u8)>,
    /// Last negotiated ATT MTU.
    pub mtu: Option<u16>,
    pub advertising_enabled: bool,
    pub timer_armed: bool,
}
