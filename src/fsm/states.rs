//! State transitions.
//!
//! ```text
//!  Idle ─[start]─▶ StartingAdvertising ─[AdvertiseFast]─▶ AdvertisingFast
//!   ▲                                                        │      ▲
//!   │                                              [timer]   ▼      │ [disconnect,
//!   │                                          AdvertisingLowPower  │  adv enabled]
//!   │                                                        │      │
//!   │                                     [connection complete]     │
//!   │                                                        ▼      │
//!   └──────────[AdvertiseStop / disconnect]──────────── Connected ──┘
//! ```
//!
//! Transitions issue controller commands with the state lock held and
//! report to the application only through the [`Outbox`].

use log::{debug, info, warn};

use super::context::ConnectionParameters;
use super::{GapCore, GapState, Outbox, check, emit};
use crate::app::events::GapEvent;
use crate::app::ports::{AdvertisingType, Controller, DiscoverableParams, OwnAddressType, reason};

/// Fast advertising interval bounds (0.625 ms units): 80–100 ms.
pub const FAST_ADV_INTERVAL: (u16, u16) = (0x0080, 0x00A0);
/// Low-power advertising interval bounds (0.625 ms units): 1–2.5 s.
pub const LOW_POWER_ADV_INTERVAL: (u16, u16) = (0x0640, 0x0FA0);

impl<C: Controller> GapCore<C> {
    // ── Advertising ───────────────────────────────────────────

    /// Enter `AdvertisingFast` or `AdvertisingLowPower` and (re)arm the
    /// advertising timer.
    pub(crate) fn advertise_start(&mut self, new_state: GapState, out: &mut Outbox) {
        let (interval_min, interval_max) = if new_state == GapState::AdvertisingFast {
            FAST_ADV_INTERVAL
        } else {
            LOW_POWER_ADV_INTERVAL
        };

        self.timer.stop();

        // The interval can only change while advertising is off.
        if new_state == GapState::AdvertisingLowPower && self.state.is_advertising() {
            check(self.controller.set_non_discoverable(), "set_non_discoverable");
        }

        let params = DiscoverableParams {
            adv_type: AdvertisingType::ConnectableUndirected,
            interval_min,
            interval_max,
            own_address: OwnAddressType::Public,
            local_name: &self.identity.local_name,
            service_uuids: &self.identity.service_uuids,
        };
        check(self.controller.set_discoverable(&params), "set_discoverable");

        info!("GAP: {} -> {}", self.state.name(), new_state.name());
        self.state = new_state;
        emit(out, GapEvent::StartAdvertising);
        self.timer.arm(self.config.timings.fast_adv_window());
    }

    /// Stop advertising, dropping the link if connected.  Always reports
    /// `StopAdvertising`, even when already idle.
    pub(crate) fn advertise_stop(&mut self, out: &mut Outbox) {
        if self.state.is_active() {
            if self.state == GapState::Connected {
                if let Some(handle) = self.conn.handle {
                    check(
                        self.controller
                            .terminate(handle, reason::REMOTE_USER_TERMINATED),
                        "terminate",
                    );
                }
            }
            self.timer.stop();
            check(self.controller.set_non_discoverable(), "set_non_discoverable");
            info!("GAP: {} -> Idle", self.state.name());
            self.state = GapState::Idle;
        }
        emit(out, GapEvent::StopAdvertising);
    }

    // ── Connection ────────────────────────────────────────────

    /// A central connected.
    pub(crate) fn on_connection_complete(&mut self, handle: u16, params: ConnectionParameters) {
        self.timer.stop();
        self.conn.params = params;
        self.conn.handle = Some(handle);
        info!("GAP: {} -> Connected (handle 0x{handle:04X})", self.state.name());
        self.state = GapState::Connected;

        self.verify_connection_parameters();
        self.fetch_rssi();

        check(
            self.controller.slave_security_request(handle),
            "slave_security_request",
        );
    }

    pub(crate) fn on_connection_update(&mut self, params: ConnectionParameters) {
        self.conn.params = params;
        info!("GAP: connection parameters updated");
        self.verify_connection_parameters();
        self.fetch_rssi();
    }

    /// The link went down.  Restarts fast advertising when the application
    /// still wants it and the core was still connected.
    pub(crate) fn on_disconnection_complete(&mut self, handle: u16, reason: u8, out: &mut Outbox) {
        if self.conn.handle != Some(handle) {
            warn!(
                "GAP: disconnect for unknown handle 0x{handle:04X} (current {:?}), ignored",
                self.conn.handle
            );
            debug!("GAP: state left at {}, no advertising reset", self.state.name());
            return;
        }
        info!("GAP: disconnected, reason 0x{reason:02X}");
        self.conn.clear();

        // Already terminated by a stop; the radio matches the current state.
        if self.state != GapState::Connected {
            debug!("GAP: link already released, staying in {}", self.state.name());
            emit(out, GapEvent::Disconnected);
            return;
        }
        self.state = GapState::Idle;

        // The controller needs a moment before it accepts new advertising
        // parameters.
        std::thread::sleep(self.config.timings.disconnect_settle());

        if self.enable_adv {
            self.advertise_start(GapState::AdvertisingFast, out);
        }
        emit(out, GapEvent::Disconnected);
    }

    /// Ask the central for an interval within the configured range when
    /// the current one is outside it.
    pub(crate) fn verify_connection_parameters(&mut self) {
        let p = self.conn.params;
        info!(
            "GAP: connection interval {} ({} ms), slave latency {}, supervision timeout {} ms",
            p.interval,
            p.interval_ms(),
            p.slave_latency,
            p.supervision_timeout_ms()
        );

        let range = self.config.conn_interval;
        if range.contains(p.interval) {
            return;
        }
        let Some(handle) = self.conn.handle else {
            return;
        };
        warn!("GAP: unsupported connection interval, requesting update");
        check(
            self.controller.connection_parameter_update_request(
                handle,
                range.min,
                range.max,
                p.slave_latency,
                p.supervision_timeout,
            ),
            "connection parameter update request",
        );
    }

    /// Refresh the cached RSSI from the controller.
    pub(crate) fn fetch_rssi(&mut self) {
        let Some(handle) = self.conn.handle else {
            return;
        };
        match self.controller.read_rssi(handle) {
            Ok(rssi) => {
                self.conn.rssi = rssi;
                self.conn.rssi_sampled_at = Some(self.clock.uptime_ms());
            }
            Err(status) => debug!("GAP: failed to read RSSI, {status}"),
        }
    }
}
