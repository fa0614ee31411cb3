//! Public GAP interface.
//!
//! ```text
//!  application ──start/stop──▶ Gap ──post──▶ CommandQueue ──▶ gap-worker ─┐
//!                                 │                  ▲                    │
//!  controller ──notify(pkt)──▶ hci::decode          adv timer             │
//!                                 │                                       ▼
//!                                 └──▶ translator ──▶ Mutex<GapCore> ◀────┘
//!                                                         │ Outbox + ticket
//!                                                         ▼
//!                                        GapEventHandler (state lock released)
//! ```
//!
//! # Callback delivery
//!
//! Every locked section that produced events draws a delivery ticket before
//! it releases the state lock.  Outboxes are then handed to the application
//! strictly in ticket order, so callbacks arrive in the order the state
//! machine produced them, yet none of them runs with the state lock held.
//! A handler may therefore call [`Gap::state`], [`Gap::remote_rssi`],
//! [`Gap::start_advertising`] or [`Gap::stop_advertising`].  It must not
//! call [`Gap::notify`], [`Gap::handle_controller_event`] or
//! [`Gap::shutdown`]: those wait for the delivery in progress.
//!
//! The answer to [`GapEvent::PinCodeVerify`] is relayed to the controller
//! right after the handler returns.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::adapters::device_id;
use crate::app::events::GapEvent;
use crate::app::ports::{
    AuthRequirement, ConfigData, Controller, GapEventHandler, GapServiceHandles, OwnAddressType,
    PhyPreference, SecureConnections,
};
use crate::config::{GapConfig, SecurityPolicy};
use crate::error::{GapError, Result};
use crate::fsm::context::{GapDiagnostics, RemoteRssi};
use crate::fsm::{GapCore, GapState, Outbox, check};
use crate::hci::{self, ControllerEvent, HciError};
use crate::identity::AdvertisingIdentity;
use crate::timer::{AdvertisingTimer, TimerTask};
use crate::translator::{self, PendingConfirm};
use crate::worker::{self, CommandQueue};

/// Identity root key used to derive LTK and CSRK.
const GAP_IRK: [u8; 16] = [
    0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0,
];
/// Encryption root key used to derive LTK and CSRK.
const GAP_ERK: [u8; 16] = [
    0xFE, 0xDC, 0xBA, 0x09, 0x87, 0x65, 0x43, 0x21, 0xFE, 0xDC, 0xBA, 0x09, 0x87, 0x65, 0x43, 0x21,
];

/// TX power level code for 0 dBm, high-power mode.
const TX_POWER_0_DBM: u8 = 0x19;
const ENCRYPTION_KEY_SIZE_MIN: u8 = 8;
const ENCRYPTION_KEY_SIZE_MAX: u8 = 16;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Delivery ──────────────────────────────────────────────────

struct Gate<H> {
    handler: H,
    /// Ticket whose outbox is delivered next.
    serving: u32,
}

/// Ends one delivery turn, even if the handler panicked.
struct Turn<'a, H> {
    gate: MutexGuard<'a, Gate<H>>,
    turn: &'a Condvar,
}

impl<H> Drop for Turn<'_, H> {
    fn drop(&mut self) {
        self.gate.serving = self.gate.serving.wrapping_add(1);
        self.turn.notify_all();
    }
}

struct Shared<C, H> {
    core: Mutex<GapCore<C>>,
    gate: Mutex<Gate<H>>,
    turn: Condvar,
    next_ticket: AtomicU32,
    /// Set with the state lock held when shutdown begins.
    closed: AtomicBool,
    queue: Arc<CommandQueue>,
}

impl<C: Controller, H: GapEventHandler> Shared<C, H> {
    /// Worker entry point.
    fn apply(&self, command: crate::app::commands::GapCommand) {
        let mut core = lock(&self.core);
        let mut out = Outbox::new();
        core.apply(command, &mut out);
        self.dispatch(core, out, None);
    }

    fn handle_event(&self, event: ControllerEvent) {
        let mut core = lock(&self.core);
        if core.is_shut_down() {
            debug!("GAP: {event:?} after shutdown, ignored");
            return;
        }
        let mut out = Outbox::new();
        let pending = translator::translate(&mut core, event, &mut out);
        self.dispatch(core, out, pending);
    }

    /// Release the state lock and hand `out` to the application in turn.
    fn dispatch(&self, core: MutexGuard<'_, GapCore<C>>, out: Outbox, pending: Option<PendingConfirm>) {
        if out.is_empty() {
            return;
        }
        // Drawn under the state lock: ticket order is production order.
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        drop(core);

        let answer = self.deliver(ticket, out);

        if let (Some(pending), Some(accept)) = (pending, answer) {
            let mut core = lock(&self.core);
            if core.is_shut_down() {
                return;
            }
            info!(
                "GAP: numeric comparison {}",
                if accept { "accepted" } else { "rejected" }
            );
            check(
                core.controller
                    .numeric_comparison_confirm(pending.handle, accept),
                "numeric_comparison_confirm",
            );
        }
    }

    /// Run the handler over `out` once every earlier ticket is delivered.
    /// Returns the handler's answer to a `PinCodeVerify`, if there was one.
    fn deliver(&self, ticket: u32, out: Outbox) -> Option<bool> {
        let mut gate = lock(&self.gate);
        while gate.serving != ticket {
            gate = self
                .turn
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let mut turn = Turn {
            gate,
            turn: &self.turn,
        };
        if self.closed.load(Ordering::Acquire) {
            debug!("GAP: {} event(s) after shutdown, dropped", out.len());
            return None;
        }

        let mut answer = None;
        for event in out {
            let accepted = turn.gate.handler.on_event(event);
            if let GapEvent::PinCodeVerify(_) = event {
                answer = Some(accepted);
            }
        }
        answer
    }

    /// Wait until every ticket drawn so far has had its turn.
    fn wait_delivered(&self) {
        let mut gate = lock(&self.gate);
        while gate.serving != self.next_ticket.load(Ordering::Acquire) {
            gate = self
                .turn
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// ── Gap ───────────────────────────────────────────────────────

struct Threads {
    worker: JoinHandle<()>,
    timer: TimerTask,
}

/// A running GAP peripheral.
///
/// Owns the worker and timer threads; [`Gap::shutdown`] (or dropping the
/// value) stops them.  Share it across threads with `Arc`.
pub struct Gap<C: Controller + 'static, H: GapEventHandler + 'static> {
    shared: Arc<Shared<C, H>>,
    threads: Mutex<Option<Threads>>,
    policy: SecurityPolicy,
    identity: AdvertisingIdentity,
}

impl<C: Controller + 'static, H: GapEventHandler + 'static> Gap<C, H> {
    /// Configure the controller and start the GAP threads.
    ///
    /// Fails without leaving anything running when the radio stack is not
    /// ready, the configuration is invalid, or a thread cannot be spawned.
    /// Controller command failures during configuration are logged only.
    pub fn init(config: GapConfig, mut controller: C, handler: H) -> Result<Self> {
        config.validate()?;
        if !controller.is_radio_ready() {
            warn!("GAP: radio stack not ready");
            return Err(GapError::RadioNotReady);
        }

        let identity = AdvertisingIdentity::build(&config, device_id::read_unique_id())?;
        let policy = SecurityPolicy::from_config(&config);
        info!("GAP: advertising name '{}'", config.name);
        let m = config.mac_address;
        debug!(
            "GAP: MAC {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[5], m[4], m[3], m[2], m[1], m[0]
        );
        configure_controller(&mut controller, &config, &identity, &policy);

        let timer = Arc::new(AdvertisingTimer::new());
        let queue = Arc::new(CommandQueue::new());
        let core = GapCore::new(controller, config, identity.clone(), Arc::clone(&timer));
        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            gate: Mutex::new(Gate {
                handler,
                serving: 0,
            }),
            turn: Condvar::new(),
            next_ticket: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            queue: Arc::clone(&queue),
        });

        let timer_task = TimerTask::spawn(timer, Arc::clone(&queue)).map_err(|e| {
            error!("GAP: timer thread: {e}");
            GapError::ThreadSpawn
        })?;
        let for_worker = Arc::clone(&shared);
        let worker = match worker::spawn(queue, move |command| for_worker.apply(command)) {
            Ok(handle) => handle,
            Err(e) => {
                error!("GAP: worker thread: {e}");
                timer_task.join();
                return Err(GapError::ThreadSpawn);
            }
        };

        info!("GAP: ready");
        Ok(Self {
            shared,
            threads: Mutex::new(Some(Threads {
                worker,
                timer: timer_task,
            })),
            policy,
            identity,
        })
    }

    /// Begin fast advertising.  No-op unless `Idle`.  A full command queue
    /// leaves the state untouched.
    pub fn start_advertising(&self) -> Result<()> {
        let mut core = lock(&self.shared.core);
        if core.is_shut_down() {
            return Err(GapError::ShutDown);
        }
        let enable_adv = core.enable_adv;
        if let Some(command) = core.request_start() {
            if let Err(e) = worker::post(&self.shared.queue, command) {
                core.state = GapState::Idle;
                core.enable_adv = enable_adv;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop advertising and drop any connection.  No-op when `Idle`.
    pub fn stop_advertising(&self) -> Result<()> {
        let mut core = lock(&self.shared.core);
        if core.is_shut_down() {
            return Err(GapError::ShutDown);
        }
        let enable_adv = core.enable_adv;
        if let Some(command) = core.request_stop() {
            if let Err(e) = worker::post(&self.shared.queue, command) {
                core.enable_adv = enable_adv;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Current state; `Uninitialized` after shutdown.
    pub fn state(&self) -> GapState {
        lock(&self.shared.core).state()
    }

    /// RSSI of the current link, sampled on the spot while connected.
    pub fn remote_rssi(&self) -> RemoteRssi {
        lock(&self.shared.core).remote_rssi()
    }

    /// Feed a decoded controller event.  Ignored after shutdown.
    pub fn handle_controller_event(&self, event: ControllerEvent) {
        self.shared.handle_event(event);
    }

    /// Feed a raw HCI event packet from the controller transport.
    pub fn notify(&self, packet: &[u8]) -> core::result::Result<(), HciError> {
        let event = hci::decode(packet).inspect_err(|e| warn!("GAP: dropped packet, {e}"))?;
        self.handle_controller_event(event);
        Ok(())
    }

    pub fn diagnostics(&self) -> GapDiagnostics {
        lock(&self.shared.core).diagnostics()
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        self.policy
    }

    pub fn identity(&self) -> &AdvertisingIdentity {
        &self.identity
    }

    /// Mark the instance shut down and stop the worker and the timer.
    /// Idempotent.  No event reaches the handler once this returns; a
    /// delivery already running is waited for, pending ones are dropped.
    ///
    /// Must not be called from the event handler.
    pub fn shutdown(&self) {
        let Some(threads) = lock(&self.threads).take() else {
            return;
        };
        info!("GAP: shutting down");
        {
            let mut core = lock(&self.shared.core);
            core.shut_down();
            self.shared.closed.store(true, Ordering::Release);
        }
        // Commands still queued are drained and dropped by the worker.
        worker::post_shutdown(&self.shared.queue);
        if threads.worker.join().is_err() {
            error!("GAP: worker thread panicked");
        }
        threads.timer.join();
        // Outboxes still waiting for their turn are dropped.
        self.shared.wait_delivered();
        info!("GAP: stopped");
    }
}

impl<C: Controller + 'static, H: GapEventHandler + 'static> Drop for Gap<C, H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Controller configuration ─────────────────────────────────

/// One-time controller setup: addresses and keys, GATT/GAP layers, GAP
/// characteristics, PHY and pairing parameters.
fn configure_controller<C: Controller>(
    controller: &mut C,
    config: &GapConfig,
    identity: &AdvertisingIdentity,
    policy: &SecurityPolicy,
) {
    for data in [
        ConfigData::PublicAddress(config.mac_address),
        ConfigData::StaticRandomAddress(identity.static_address),
        ConfigData::IdentityRootKey(GAP_IRK),
        ConfigData::EncryptionRootKey(GAP_ERK),
    ] {
        check(controller.write_config_data(&data), "write_config_data");
    }
    check(controller.set_tx_power(true, TX_POWER_0_DBM), "set_tx_power");
    check(controller.gatt_init(), "gatt_init");

    let name = identity.device_name.as_bytes();
    // The name is at most 32 bytes.
    let handles: Option<GapServiceHandles> =
        check(controller.gap_init(name.len() as u8), "gap_init");
    if let Some(h) = handles {
        check(
            controller.update_char_value(h.service, h.device_name, name),
            "device name characteristic update",
        );
        check(
            controller.update_char_value(h.service, h.appearance, &identity.appearance.to_le_bytes()),
            "appearance characteristic update",
        );
    }

    check(controller.set_default_phy(PhyPreference::PREFER_2M), "set_default_phy");
    check(controller.set_io_capability(policy.io_capability), "set_io_capability");
    let requirement = AuthRequirement {
        bonding: policy.bonding,
        mitm: policy.mitm,
        secure_connections: SecureConnections::Optional,
        keypress_notification: policy.keypress_notification,
        min_encryption_key_size: ENCRYPTION_KEY_SIZE_MIN,
        max_encryption_key_size: ENCRYPTION_KEY_SIZE_MAX,
        use_fixed_pin: policy.fixed_pin,
        fixed_pin: 0,
        identity_address: OwnAddressType::Public,
    };
    check(
        controller.set_authentication_requirement(&requirement),
        "set_authentication_requirement",
    );
    check(controller.configure_whitelist(), "configure_whitelist");
}
