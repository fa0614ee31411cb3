//! Controller event translator.
//!
//! Runs with the GAP state lock held.  Each [`ControllerEvent`] updates the
//! core and may push application events into the outbox:
//!
//! | controller event          | application event(s)                      |
//! |---------------------------|-------------------------------------------|
//! | disconnection complete    | `StartAdvertising`?, `Disconnected`       |
//! | pass-key request          | `PinCodeShow(pin)`                        |
//! | numeric comparison value  | `PinCodeVerify(value)` (answer relayed)   |
//! | ATT exchange-MTU response | `MtuNegotiated(mtu - 3)`                  |
//! | pairing complete (ok)     | `Connected`                               |
//! | everything else           | none                                      |

use log::{debug, error, info, warn};

use crate::adapters::entropy;
use crate::app::events::{ATT_HEADER_LEN, GapEvent};
use crate::app::ports::{Controller, reason};
use crate::fsm::{GapCore, Outbox, check, emit};
use crate::hci::ControllerEvent;

/// A numeric comparison waiting for the application's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConfirm {
    pub handle: u16,
}

/// Apply one controller event to the core.
///
/// Returns the link awaiting a numeric-comparison answer, if the event
/// asked the application to verify a value.
pub fn translate<C: Controller>(
    core: &mut GapCore<C>,
    event: ControllerEvent,
    out: &mut Outbox,
) -> Option<PendingConfirm> {
    match event {
        ControllerEvent::DisconnectionComplete { handle, reason, .. } => {
            core.on_disconnection_complete(handle, reason, out);
        }

        ControllerEvent::ConnectionComplete {
            status,
            handle,
            peer_address,
            params,
            ..
        } => {
            if status != 0 {
                warn!("GAP: connection failed, status 0x{status:02X}");
                return None;
            }
            debug!("GAP: central {peer_address:02X?}");
            core.on_connection_complete(handle, params);
        }

        ControllerEvent::ConnectionUpdateComplete { status, params, .. } => {
            if status != 0 {
                warn!("GAP: connection update failed, status 0x{status:02X}");
                return None;
            }
            core.on_connection_update(params);
        }

        ControllerEvent::PhyUpdateComplete { status, .. } => {
            if status != 0 {
                error!("GAP: PHY update failed, status 0x{status:02X}");
            } else {
                info!("GAP: PHY update succeeded");
            }
            if let Some(handle) = core.conn.handle {
                if let Some((tx, rx)) = check(core.controller.read_phy(handle), "read_phy") {
                    info!("GAP: PHY TX={tx}, RX={rx}");
                    core.phy = Some((tx, rx));
                }
            }
        }

        ControllerEvent::PassKeyRequest { handle } => {
            let pin = entropy::random_pin();
            check(core.controller.pass_key_response(handle, pin), "pass_key_response");
            if core.config.hide_pin_in_logs {
                info!("GAP: pass key request, PIN ******");
            } else {
                info!("GAP: pass key request, PIN {pin:06}");
            }
            emit(out, GapEvent::PinCodeShow(pin));
        }

        ControllerEvent::NumericComparisonValue { handle, value } => {
            info!("GAP: verify numeric comparison {value:06}");
            emit(out, GapEvent::PinCodeVerify(value));
            return Some(PendingConfirm { handle });
        }

        ControllerEvent::AttExchangeMtuResponse { server_rx_mtu, .. } => {
            info!("GAP: RX MTU {server_rx_mtu}");
            if server_rx_mtu < ATT_HEADER_LEN {
                warn!("GAP: MTU {server_rx_mtu} smaller than the ATT header");
            }
            core.mtu = Some(server_rx_mtu);
            emit(out, GapEvent::mtu_negotiated(server_rx_mtu));
        }

        ControllerEvent::PairingComplete { status, .. } => {
            if status != 0 {
                error!("GAP: pairing failed, status 0x{status:02X}, terminating");
                if let Some(handle) = core.conn.handle {
                    check(
                        core.controller
                            .terminate(handle, reason::AUTHENTICATION_FAILURE),
                        "terminate",
                    );
                }
            } else {
                core.fetch_rssi();
                info!("GAP: pairing complete");
                emit(out, GapEvent::Connected);
            }
        }

        ControllerEvent::BondLost => {
            debug!("GAP: bond lost, allowing rebond");
            match core.conn.handle {
                Some(handle) => {
                    check(core.controller.allow_rebond(handle), "allow_rebond");
                }
                None => warn!("GAP: bond lost without a link"),
            }
        }

        ControllerEvent::L2capConnectionUpdateResponse { result, .. } => match result {
            0 => debug!("GAP: connection parameters accepted"),
            1 => debug!("GAP: connection parameters denied"),
            other => debug!("GAP: connection parameter response {other}"),
        },

        ControllerEvent::LimitedDiscoverable => info!("GAP: limited discoverable"),
        ControllerEvent::AuthorizationRequest => debug!("GAP: authorization request"),
        ControllerEvent::SlaveSecurityInitiated => debug!("GAP: slave security initiated"),
        ControllerEvent::DeviceFound => debug!("GAP: device found"),
        ControllerEvent::ProcedureComplete => debug!("GAP: procedure complete"),
        ControllerEvent::AddressNotResolved => debug!("GAP: address not resolved"),
        ControllerEvent::KeypressNotification => debug!("GAP: keypress notification"),
        ControllerEvent::Unknown {
            event_code,
            subcode,
        } => debug!("GAP: unhandled event 0x{event_code:02X}/0x{subcode:04X}"),
    }
    None
}
