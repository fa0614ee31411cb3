//! Runtime symbols the GAP threads need from ESP-IDF.
//!
//! * `critical-section`: the command queue and the timer signal are
//!   `embassy-sync` primitives over `CriticalSectionRawMutex`.  Backed here
//!   by one process-wide mutex, re-entrant per thread.
//! * `embassy-time` driver: the advertising timer sleeps through
//!   `async-io-mini`, which asks embassy-time for `now` and for a wake-up.
//!   `now` reads `esp_timer` (1 MHz, matching embassy-time's default tick);
//!   each wake-up is served by a short-lived sleeper thread.  Only the
//!   advertising timer thread schedules wake-ups, so there is at most one
//!   sleeper per pending window.
//!
//! On the host, `critical-section/std` and `embassy-time/std` provide all
//! of this.

#[cfg(target_os = "espidf")]
use core::cell::{Cell, RefCell};
#[cfg(target_os = "espidf")]
use core::time::Duration;
#[cfg(target_os = "espidf")]
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(target_os = "espidf")]
const WAKE_STACK_BYTES: usize = 2 * 1024;

#[cfg(target_os = "espidf")]
static GAP_CS: Mutex<()> = Mutex::new(());

#[cfg(target_os = "espidf")]
thread_local! {
    static GAP_CS_DEPTH: Cell<u8> = const { Cell::new(0) };
    static GAP_CS_GUARD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

// ── critical-section ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    GAP_CS_DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            let guard = GAP_CS.lock().unwrap_or_else(PoisonError::into_inner);
            GAP_CS_GUARD.with(|slot| *slot.borrow_mut() = Some(guard));
        }
        let d = d.saturating_add(1);
        depth.set(d);
        d
    })
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(_token: u8) {
    GAP_CS_DEPTH.with(|depth| match depth.get() {
        0 => {}
        1 => {
            depth.set(0);
            GAP_CS_GUARD.with(|slot| *slot.borrow_mut() = None);
        }
        d => depth.set(d - 1),
    });
}

// ── embassy-time driver ───────────────────────────────────────

/// Microseconds since boot.
#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _embassy_time_now() -> u64 {
    // SAFETY: plain read of the esp_timer counter.
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    us.max(0) as u64
}

/// Wake `waker` at tick `at`.
#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _embassy_time_schedule_wake(at: u64, waker: *mut core::ffi::c_void) {
    if waker.is_null() {
        return;
    }
    // SAFETY: embassy-time passes a `&Waker` valid for this call; it is
    // cloned before returning.
    let waker = unsafe { (*waker.cast::<core::task::Waker>()).clone() };

    let delay = at.saturating_sub(_embassy_time_now());
    if delay == 0 {
        waker.wake();
        return;
    }
    let sleeper = std::thread::Builder::new()
        .name("gap-adv-wake".into())
        .stack_size(WAKE_STACK_BYTES)
        .spawn({
            let waker = waker.clone();
            move || {
                std::thread::sleep(Duration::from_micros(delay));
                waker.wake();
            }
        });
    if let Err(e) = sleeper {
        // Waking now makes the timer poll again and reschedule.
        log::error!("GAP timer: wake thread: {e}");
        waker.wake();
    }
}
