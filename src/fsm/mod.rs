//! GAP connection state machine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  GapCore<C: Controller>          (behind the GAP state lock) │
//! │  ┌──────────────┬─────────────────┬──────────────────────┐  │
//! │  │ GapState     │ ConnectionCtx   │ enable_adv, phy, mtu │  │
//! │  └──────────────┴─────────────────┴──────────────────────┘  │
//! │        ▲ worker: apply(GapCommand)                          │
//! │        ▲ translator: controller events                      │
//! │        ▼ Outbox of GapEvents, delivered after the lock      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation happens through `&mut GapCore`, so the borrow checker
//! enforces what the lock guarantees at runtime: the worker and the
//! translator never interleave.  Transitions never call the application
//! directly; they push events into an [`Outbox`] that the caller drains
//! once the state lock is released.

pub mod context;
pub mod states;

use std::sync::Arc;

use log::{debug, error, info};

use crate::adapters::time::MonotonicClock;
use crate::app::commands::GapCommand;
use crate::app::events::GapEvent;
use crate::app::ports::{Controller, ControllerResult};
use crate::config::GapConfig;
use crate::identity::AdvertisingIdentity;
use crate::timer::AdvertisingTimer;
use context::{ConnectionContext, GapDiagnostics, RSSI_UNKNOWN, RemoteRssi};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Connection/advertising state.  Ordered: anything above `Idle` is
/// advertising or connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum GapState {
    Uninitialized = 0,
    Idle = 1,
    StartingAdvertising = 2,
    AdvertisingFast = 3,
    AdvertisingLowPower = 4,
    Connected = 5,
}

impl GapState {
    /// Advertising (or about to) or connected.
    pub fn is_active(self) -> bool {
        self > Self::Idle
    }

    pub fn is_advertising(self) -> bool {
        matches!(self, Self::AdvertisingFast | Self::AdvertisingLowPower)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Idle => "Idle",
            Self::StartingAdvertising => "StartingAdvertising",
            Self::AdvertisingFast => "AdvertisingFast",
            Self::AdvertisingLowPower => "AdvertisingLowPower",
            Self::Connected => "Connected",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Events produced by one locked section.  The largest burst is a
/// disconnect that restarts advertising (two events).
pub type Outbox = heapless::Vec<GapEvent, 4>;

pub(crate) fn emit(out: &mut Outbox, event: GapEvent) {
    if out.push(event).is_err() {
        error!("GAP: outbox full, dropping {event:?}");
    }
}

/// Log a failed controller command.  Failures never roll back local
/// bookkeeping: the controller stays the source of truth for the radio.
pub(crate) fn check<T>(result: ControllerResult<T>, what: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(status) => {
            error!("GAP: {what} failed, {status}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// GAP core
// ---------------------------------------------------------------------------

/// All mutable GAP state plus the controller it drives.
pub struct GapCore<C> {
    pub(crate) controller: C,
    pub(crate) config: GapConfig,
    pub(crate) identity: AdvertisingIdentity,
    pub(crate) timer: Arc<AdvertisingTimer>,
    pub(crate) clock: MonotonicClock,
    pub(crate) state: GapState,
    pub(crate) conn: ConnectionContext,
    /// Advertising requested by the application; restarts advertising
    /// after a disconnect.
    pub(crate) enable_adv: bool,
    pub(crate) phy: Option<(u8, u8)>,
    pub(crate) mtu: Option<u16>,
}

impl<C: Controller> GapCore<C> {
    /// Fresh core in `Idle`, advertising enabled.
    pub fn new(
        controller: C,
        config: GapConfig,
        identity: AdvertisingIdentity,
        timer: Arc<AdvertisingTimer>,
    ) -> Self {
        Self {
            controller,
            config,
            identity,
            timer,
            clock: MonotonicClock::new(),
            state: GapState::Idle,
            conn: ConnectionContext::default(),
            enable_adv: true,
            phy: None,
            mtu: None,
        }
    }

    pub fn state(&self) -> GapState {
        self.state
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn is_shut_down(&self) -> bool {
        self.state == GapState::Uninitialized
    }

    // ── API guards ────────────────────────────────────────────

    /// `start_advertising` bookkeeping.  Returns the command to queue, if
    /// any.
    pub fn request_start(&mut self) -> Option<GapCommand> {
        if self.state != GapState::Idle {
            debug!("GAP: start ignored in {}", self.state.name());
            return None;
        }
        info!("GAP: start advertising");
        self.state = GapState::StartingAdvertising;
        self.enable_adv = true;
        Some(GapCommand::AdvertiseFast)
    }

    /// `stop_advertising` bookkeeping.  Returns the command to queue, if
    /// any.
    pub fn request_stop(&mut self) -> Option<GapCommand> {
        if !self.state.is_active() {
            debug!("GAP: stop ignored in {}", self.state.name());
            return None;
        }
        info!("GAP: stop advertising");
        self.enable_adv = false;
        Some(GapCommand::AdvertiseStop)
    }

    // ── Worker dispatch ───────────────────────────────────────

    /// Apply one dequeued command.
    pub fn apply(&mut self, command: GapCommand, out: &mut Outbox) {
        if self.is_shut_down() {
            debug!("GAP: {command:?} after shutdown, dropped");
            return;
        }
        match command {
            GapCommand::AdvertiseFast => {
                if self.state == GapState::Connected {
                    debug!("GAP: fast advertising dropped in {}", self.state.name());
                    return;
                }
                self.advertise_start(GapState::AdvertisingFast, out);
            }
            GapCommand::AdvertiseLowPower => {
                // The timer can fire just as a connection completes or
                // advertising stops; only an advertising state may drop
                // to low power.
                if !self.state.is_advertising() {
                    debug!("GAP: low-power advertising dropped in {}", self.state.name());
                    return;
                }
                self.advertise_start(GapState::AdvertisingLowPower, out);
            }
            GapCommand::AdvertiseStop => self.advertise_stop(out),
            GapCommand::Shutdown => {}
        }
    }

    /// Stop the timer, stop advertising bookkeeping and mark the core
    /// unusable.
    pub fn shut_down(&mut self) {
        self.timer.stop();
        self.enable_adv = false;
        self.state = GapState::Uninitialized;
    }

    // ── Queries ───────────────────────────────────────────────

    /// RSSI of the current link, refreshed on the spot while connected.
    pub fn remote_rssi(&mut self) -> RemoteRssi {
        if self.state != GapState::Connected {
            return RemoteRssi::NONE;
        }
        self.fetch_rssi();
        match self.conn.rssi_sampled_at {
            Some(at) => RemoteRssi {
                rssi: self.conn.rssi,
                age_ms: self.clock.elapsed_since(at).max(1),
            },
            None => RemoteRssi {
                rssi: RSSI_UNKNOWN,
                age_ms: 0,
            },
        }
    }

    pub fn diagnostics(&self) -> GapDiagnostics {
        GapDiagnostics {
            state: self.state,
            connection_handle: self.conn.handle,
            params: self.conn.params,
            rssi: self.conn.rssi,
            phy: self.phy,
            mtu: self.mtu,
            advertising_enabled: self.enable_adv,
            timer_armed: self.timer.is_armed(),
        }
    }
}
