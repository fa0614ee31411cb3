//! Advertising timer.
//!
//! Single-shot, re-armable.  Fast advertising arms it for the fast window;
//! on expiry it posts [`GapCommand::AdvertiseLowPower`] to the command
//! queue and never touches GAP state itself.
//!
//! ```text
//!   arm(w) / stop() / exit()          gap-adv-timer thread
//!   ───────────────────────▶ Signal ─▶ or(wait op, Timer::after(w))
//!                                         │ expired and still current
//!                                         ▼
//!                              queue.try_send(AdvertiseLowPower)
//! ```
//!
//! `armed` holds the generation of the pending window (0 = disarmed), so a
//! window that was stopped or replaced while the thread was sleeping on it
//! can never fire.

use core::time::Duration;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::JoinHandle;

// Sleeps go through embassy-time: its `std` driver on the host, the
// esp_timer-backed symbols in `esp_link_shims` on ESP-IDF.
use async_io_mini::Timer;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, info, warn};

use crate::app::commands::GapCommand;
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::worker::{self, CommandQueue};

const TIMER_TASK: TaskSpec = TaskSpec {
    name: "gap-adv-timer\0",
    core: Core::Pro,
    priority: 4,
    stack_kb: 4,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerOp {
    Arm { window: Duration, generation: u32 },
    Stop,
    Exit,
}

pub struct AdvertisingTimer {
    ops: Signal<CriticalSectionRawMutex, TimerOp>,
    armed: AtomicU32,
    generation: AtomicU32,
}

impl Default for AdvertisingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvertisingTimer {
    pub const fn new() -> Self {
        Self {
            ops: Signal::new(),
            armed: AtomicU32::new(0),
            generation: AtomicU32::new(0),
        }
    }

    /// (Re)start the single-shot window.  Replaces any pending expiry.
    pub fn arm(&self, window: Duration) {
        let mut generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        if generation == 0 {
            generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        }
        self.armed.store(generation, Ordering::Release);
        self.ops.signal(TimerOp::Arm { window, generation });
    }

    /// Cancel the pending expiry, if any.
    pub fn stop(&self) {
        self.armed.store(0, Ordering::Release);
        self.ops.signal(TimerOp::Stop);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire) != 0
    }

    fn exit(&self) {
        self.armed.store(0, Ordering::Release);
        self.ops.signal(TimerOp::Exit);
    }

    /// Claim the expiry of `generation`.  False when it was stopped or
    /// replaced meanwhile.
    fn claim(&self, generation: u32) -> bool {
        self.armed
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn run(&self, queue: &CommandQueue) {
        let mut pending: Option<(Duration, u32)> = None;
        loop {
            let op = match pending.take() {
                None => self.ops.wait().await,
                Some((window, generation)) => {
                    let next = future::or(async { Some(self.ops.wait().await) }, async {
                        Timer::after(window).await;
                        None
                    })
                    .await;
                    match next {
                        Some(op) => op,
                        None => {
                            if self.claim(generation) {
                                debug!("GAP timer: fast advertising window elapsed");
                                if worker::post(queue, GapCommand::AdvertiseLowPower).is_err() {
                                    warn!("GAP timer: low-power switch lost, fast advertising continues");
                                }
                            }
                            continue;
                        }
                    }
                }
            };
            match op {
                TimerOp::Arm { window, generation } => pending = Some((window, generation)),
                TimerOp::Stop => {}
                TimerOp::Exit => break,
            }
        }
    }
}

/// Owns the timer thread.  Dropping without [`TimerTask::join`] leaves the
/// thread parked on the signal.
pub struct TimerTask {
    timer: Arc<AdvertisingTimer>,
    handle: JoinHandle<()>,
}

impl TimerTask {
    pub fn spawn(timer: Arc<AdvertisingTimer>, queue: Arc<CommandQueue>) -> io::Result<Self> {
        let t = Arc::clone(&timer);
        let handle = task_pin::spawn(TIMER_TASK, move || {
            future::block_on(t.run(&queue));
            info!("GAP timer: stopped");
        })?;
        Ok(Self { timer, handle })
    }

    /// Stop the timer thread and wait for it.
    pub fn join(self) {
        self.timer.exit();
        if self.handle.join().is_err() {
            log::error!("GAP timer: thread panicked");
        }
    }
}
