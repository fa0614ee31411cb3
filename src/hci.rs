//! HCI event packet decoder.
//!
//! Wire format of a controller notification:
//! ```text
//! ┌──────┬──────────┬──────────┬──────────────────────────────┐
//! │ 0x04 │ evt (1B) │ plen (1B)│ parameters (plen bytes)      │
//! └──────┴──────────┴──────────┴──────────────────────────────┘
//!   evt 0x05  disconnection complete   status, handle, reason
//!   evt 0x3E  LE meta                  subevent, ...
//!   evt 0xFF  vendor                   ecode (LE u16), ...
//! ```
//!
//! All multi-byte fields are little-endian.  Decoding is total: any input
//! either yields a [`ControllerEvent`] or an [`HciError`], never a panic.
//! Events the GAP core has no use for decode to [`ControllerEvent::Unknown`].

use core::fmt;

use crate::fsm::context::ConnectionParameters;

/// HCI packet indicator for events.
pub const HCI_EVENT_PACKET: u8 = 0x04;

pub const EVT_DISCONN_COMPLETE: u8 = 0x05;
pub const EVT_LE_META_EVENT: u8 = 0x3E;
pub const EVT_VENDOR: u8 = 0xFF;

pub const EVT_LE_CONN_COMPLETE: u8 = 0x01;
pub const EVT_LE_CONN_UPDATE_COMPLETE: u8 = 0x03;
pub const EVT_LE_PHY_UPDATE_COMPLETE: u8 = 0x0C;

pub const EVT_BLUE_GAP_LIMITED_DISCOVERABLE: u16 = 0x0400;
pub const EVT_BLUE_GAP_PAIRING_CMPLT: u16 = 0x0401;
pub const EVT_BLUE_GAP_PASS_KEY_REQUEST: u16 = 0x0402;
pub const EVT_BLUE_GAP_AUTHORIZATION_REQUEST: u16 = 0x0403;
pub const EVT_BLUE_GAP_SLAVE_SECURITY_INITIATED: u16 = 0x0404;
pub const EVT_BLUE_GAP_BOND_LOST: u16 = 0x0405;
pub const EVT_BLUE_GAP_DEVICE_FOUND: u16 = 0x0406;
pub const EVT_BLUE_GAP_PROCEDURE_COMPLETE: u16 = 0x0407;
pub const EVT_BLUE_GAP_ADDR_NOT_RESOLVED: u16 = 0x0408;
pub const EVT_BLUE_GAP_NUMERIC_COMPARISON_VALUE: u16 = 0x0409;
pub const EVT_BLUE_GAP_KEYPRESS_NOTIFICATION: u16 = 0x040A;
pub const EVT_BLUE_L2CAP_CONNECTION_UPDATE_RESP: u16 = 0x0800;
pub const EVT_BLUE_ATT_EXCHANGE_MTU_RESP: u16 = 0x0C02;

/// A controller notification the GAP core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    DisconnectionComplete {
        status: u8,
        handle: u16,
        reason: u8,
    },
    ConnectionComplete {
        status: u8,
        handle: u16,
        role: u8,
        peer_address_type: u8,
        peer_address: [u8; 6],
        params: ConnectionParameters,
    },
    ConnectionUpdateComplete {
        status: u8,
        handle: u16,
        params: ConnectionParameters,
    },
    PhyUpdateComplete {
        status: u8,
        handle: u16,
        tx_phy: u8,
        rx_phy: u8,
    },
    PairingComplete {
        handle: u16,
        status: u8,
        reason: u8,
    },
    PassKeyRequest {
        handle: u16,
    },
    NumericComparisonValue {
        handle: u16,
        value: u32,
    },
    BondLost,
    L2capConnectionUpdateResponse {
        handle: u16,
        result: u16,
    },
    AttExchangeMtuResponse {
        handle: u16,
        server_rx_mtu: u16,
    },
    // Log-only vendor events.
    LimitedDiscoverable,
    AuthorizationRequest,
    SlaveSecurityInitiated,
    DeviceFound,
    ProcedureComplete,
    AddressNotResolved,
    KeypressNotification,
    /// Anything else: event code plus LE subevent or vendor ecode.
    Unknown {
        event_code: u8,
        subcode: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HciError {
    /// Packet shorter than its header or than the event requires.
    Truncated,
    /// First byte is not the HCI event indicator.
    NotAnEvent(u8),
    /// Parameter length field disagrees with the bytes present.
    LengthMismatch { declared: usize, actual: usize },
}

impl fmt::Display for HciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated HCI packet"),
            Self::NotAnEvent(b) => write!(f, "not an HCI event packet (0x{b:02X})"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "HCI length {declared} but {actual} bytes present")
            }
        }
    }
}

impl std::error::Error for HciError {}

// ── Field reader ─────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], HciError> {
        if self.buf.len() < n {
            return Err(HciError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, HciError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, HciError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, HciError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn params(&mut self) -> Result<ConnectionParameters, HciError> {
        Ok(ConnectionParameters {
            interval: self.u16()?,
            slave_latency: self.u16()?,
            supervision_timeout: self.u16()?,
        })
    }
}

// ── Decoder ──────────────────────────────────────────────────

/// Decode one complete HCI event packet.
pub fn decode(packet: &[u8]) -> Result<ControllerEvent, HciError> {
    let [indicator, evt, plen, params @ ..] = packet else {
        return Err(HciError::Truncated);
    };
    if *indicator != HCI_EVENT_PACKET {
        return Err(HciError::NotAnEvent(*indicator));
    }
    let declared = usize::from(*plen);
    if params.len() != declared {
        return Err(HciError::LengthMismatch {
            declared,
            actual: params.len(),
        });
    }

    let mut r = Reader::new(params);
    match *evt {
        EVT_DISCONN_COMPLETE => Ok(ControllerEvent::DisconnectionComplete {
            status: r.u8()?,
            handle: r.u16()?,
            reason: r.u8()?,
        }),
        EVT_LE_META_EVENT => decode_le_meta(&mut r),
        EVT_VENDOR => decode_vendor(&mut r),
        other => Ok(ControllerEvent::Unknown {
            event_code: other,
            subcode: 0,
        }),
    }
}

fn decode_le_meta(r: &mut Reader<'_>) -> Result<ControllerEvent, HciError> {
    let subevent = r.u8()?;
    match subevent {
        EVT_LE_CONN_COMPLETE => {
            let status = r.u8()?;
            let handle = r.u16()?;
            let role = r.u8()?;
            let peer_address_type = r.u8()?;
            let mut peer_address = [0u8; 6];
            peer_address.copy_from_slice(r.take(6)?);
            let params = r.params()?;
            let _master_clock_accuracy = r.u8()?;
            Ok(ControllerEvent::ConnectionComplete {
                status,
                handle,
                role,
                peer_address_type,
                peer_address,
                params,
            })
        }
        EVT_LE_CONN_UPDATE_COMPLETE => Ok(ControllerEvent::ConnectionUpdateComplete {
            status: r.u8()?,
            handle: r.u16()?,
            params: r.params()?,
        }),
        EVT_LE_PHY_UPDATE_COMPLETE => Ok(ControllerEvent::PhyUpdateComplete {
            status: r.u8()?,
            handle: r.u16()?,
            tx_phy: r.u8()?,
            rx_phy: r.u8()?,
        }),
        other => Ok(ControllerEvent::Unknown {
            event_code: EVT_LE_META_EVENT,
            subcode: u16::from(other),
        }),
    }
}

fn decode_vendor(r: &mut Reader<'_>) -> Result<ControllerEvent, HciError> {
    let ecode = r.u16()?;
    let event = match ecode {
        EVT_BLUE_GAP_LIMITED_DISCOVERABLE => ControllerEvent::LimitedDiscoverable,
        EVT_BLUE_GAP_PAIRING_CMPLT => ControllerEvent::PairingComplete {
            handle: r.u16()?,
            status: r.u8()?,
            reason: r.u8()?,
        },
        EVT_BLUE_GAP_PASS_KEY_REQUEST => ControllerEvent::PassKeyRequest { handle: r.u16()? },
        EVT_BLUE_GAP_AUTHORIZATION_REQUEST => ControllerEvent::AuthorizationRequest,
        EVT_BLUE_GAP_SLAVE_SECURITY_INITIATED => ControllerEvent::SlaveSecurityInitiated,
        EVT_BLUE_GAP_BOND_LOST => ControllerEvent::BondLost,
        EVT_BLUE_GAP_DEVICE_FOUND => ControllerEvent::DeviceFound,
        EVT_BLUE_GAP_PROCEDURE_COMPLETE => ControllerEvent::ProcedureComplete,
        EVT_BLUE_GAP_ADDR_NOT_RESOLVED => ControllerEvent::AddressNotResolved,
        EVT_BLUE_GAP_NUMERIC_COMPARISON_VALUE => ControllerEvent::NumericComparisonValue {
            handle: r.u16()?,
            value: r.u32()?,
        },
        EVT_BLUE_GAP_KEYPRESS_NOTIFICATION => ControllerEvent::KeypressNotification,
        EVT_BLUE_L2CAP_CONNECTION_UPDATE_RESP => ControllerEvent::L2capConnectionUpdateResponse {
            handle: r.u16()?,
            result: r.u16()?,
        },
        EVT_BLUE_ATT_EXCHANGE_MTU_RESP => ControllerEvent::AttExchangeMtuResponse {
            handle: r.u16()?,
            server_rx_mtu: r.u16()?,
        },
        other => ControllerEvent::Unknown {
            event_code: EVT_VENDOR,
            subcode: other,
        },
    };
    Ok(event)
}

// ── Encoder ──────────────────────────────────────────────────

/// Builders for event packets, as a controller would emit them.  Used by
/// the simulation binary and tests.
pub mod packet {
    use super::*;

    pub type Packet = heapless::Vec<u8, 32>;

    fn event(evt: u8, params: &[u8]) -> Packet {
        let mut p = Packet::new();
        // Callers stay below 29 parameter bytes.
        let _ = p.extend_from_slice(&[HCI_EVENT_PACKET, evt, params.len() as u8]);
        let _ = p.extend_from_slice(params);
        p
    }

    fn vendor(ecode: u16, data: &[u8]) -> Packet {
        let mut params: heapless::Vec<u8, 29> = heapless::Vec::new();
        let _ = params.extend_from_slice(&ecode.to_le_bytes());
        let _ = params.extend_from_slice(data);
        event(EVT_VENDOR, &params)
    }

    pub fn disconnection_complete(handle: u16, reason: u8) -> Packet {
        let h = handle.to_le_bytes();
        event(EVT_DISCONN_COMPLETE, &[0x00, h[0], h[1], reason])
    }

    pub fn connection_complete(handle: u16, params: ConnectionParameters) -> Packet {
        let h = handle.to_le_bytes();
        let i = params.interval.to_le_bytes();
        let l = params.slave_latency.to_le_bytes();
        let t = params.supervision_timeout.to_le_bytes();
        event(
            EVT_LE_META_EVENT,
            &[
                EVT_LE_CONN_COMPLETE,
                0x00, // status
                h[0],
                h[1],
                0x01, // role: slave
                0x00, // peer address type: public
                0x11,
                0x22,
                0x33,
                0x44,
                0x55,
                0x66,
                i[0],
                i[1],
                l[0],
                l[1],
                t[0],
                t[1],
                0x00, // master clock accuracy
            ],
        )
    }

    pub fn connection_update_complete(handle: u16, params: ConnectionParameters) -> Packet {
        let h = handle.to_le_bytes();
        let i = params.interval.to_le_bytes();
        let l = params.slave_latency.to_le_bytes();
        let t = params.supervision_timeout.to_le_bytes();
        event(
            EVT_LE_META_EVENT,
            &[
                EVT_LE_CONN_UPDATE_COMPLETE,
                0x00,
                h[0],
                h[1],
                i[0],
                i[1],
                l[0],
                l[1],
                t[0],
                t[1],
            ],
        )
    }

    pub fn phy_update_complete(handle: u16, status: u8) -> Packet {
        let h = handle.to_le_bytes();
        event(
            EVT_LE_META_EVENT,
            &[EVT_LE_PHY_UPDATE_COMPLETE, status, h[0], h[1], 0x02, 0x02],
        )
    }

    pub fn pass_key_request(handle: u16) -> Packet {
        vendor(EVT_BLUE_GAP_PASS_KEY_REQUEST, &handle.to_le_bytes())
    }

    pub fn numeric_comparison(handle: u16, value: u32) -> Packet {
        let h = handle.to_le_bytes();
        let v = value.to_le_bytes();
        vendor(
            EVT_BLUE_GAP_NUMERIC_COMPARISON_VALUE,
            &[h[0], h[1], v[0], v[1], v[2], v[3]],
        )
    }

    pub fn pairing_complete(handle: u16, status: u8) -> Packet {
        let h = handle.to_le_bytes();
        vendor(EVT_BLUE_GAP_PAIRING_CMPLT, &[h[0], h[1], status, 0x00])
    }

    pub fn bond_lost() -> Packet {
        vendor(EVT_BLUE_GAP_BOND_LOST, &[])
    }

    pub fn mtu_exchange(handle: u16, server_rx_mtu: u16) -> Packet {
        let h = handle.to_le_bytes();
        let m = server_rx_mtu.to_le_bytes();
        vendor(EVT_BLUE_ATT_EXCHANGE_MTU_RESP, &[h[0], h[1], m[0], m[1]])
    }

    pub fn l2cap_update_response(handle: u16, result: u16) -> Packet {
        let h = handle.to_le_bytes();
        let r = result.to_le_bytes();
        vendor(EVT_BLUE_L2CAP_CONNECTION_UPDATE_RESP, &[h[0], h[1], r[0], r[1]])
    }
}
