//! gap-sim: runs the GAP manager against the simulated controller.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  scripted central                                        │
//! │  (hci::packet builders)                                  │
//! │        │ raw HCI event packets                           │
//! │        ▼                                                 │
//! │  Gap::notify ──▶ translator ──▶ GapCore ──▶ SimController │
//! │        │                                    (logs calls) │
//! │        ▼                                                 │
//! │  event callback (prints, accepts numeric comparison)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `gap-sim [config.json]`.  Without an argument the default
//! configuration is used with a shortened fast-advertising window.
#![deny(unused_must_use)]

use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use ble_gap::adapters::sim_controller::SimController;
use ble_gap::fsm::context::ConnectionParameters;
use ble_gap::hci::packet;
use ble_gap::{Gap, GapConfig, GapEvent, GapState};

const CONN_HANDLE: u16 = 0x0801;

type SimGap = Gap<SimController, fn(GapEvent) -> bool>;

fn load_config() -> Result<GapConfig> {
    let Some(path) = std::env::args().nth(1) else {
        let mut config = GapConfig::default();
        config.timings.fast_adv_window_ms = 500;
        return Ok(config);
    };
    let json =
        std::fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
    let config = GapConfig::from_json(&json).with_context(|| format!("parsing config {path}"))?;
    Ok(config)
}

fn on_event(event: GapEvent) -> bool {
    match event {
        GapEvent::PinCodeShow(pin) => info!("app: enter PIN {pin:06} on the central"),
        GapEvent::PinCodeVerify(value) => {
            info!("app: confirm {value:06}? yes");
            return true;
        }
        GapEvent::MtuNegotiated(payload) => info!("app: ATT payload {payload} bytes"),
        other => info!("app: {other:?}"),
    }
    false
}

fn wait_for_state(gap: &SimGap, state: GapState) {
    for _ in 0..200 {
        if gap.state() == state {
            return;
        }
        sleep(Duration::from_millis(5));
    }
    warn!("sim: still {:?}, expected {state:?}", gap.state());
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    #[cfg(not(target_os = "espidf"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }

    info!("╔══════════════════════════════════════╗");
    info!("║  gap-sim v{:<27}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Bring up GAP ───────────────────────────────────────
    let config = load_config()?;
    let low_power_after = config.timings.fast_adv_window();
    let sim = SimController::new();
    let calls = sim.log();
    let handler: fn(GapEvent) -> bool = on_event;
    let gap: SimGap = Gap::init(config, sim, handler).context("GAP init")?;
    info!(
        "sim: advertising payload {} bytes{}",
        gap.identity().payload_len(),
        if gap.identity().is_name_shortened() { " (shortened name)" } else { "" }
    );

    // ── 3. Advertise, then let the fast window lapse ──────────
    gap.start_advertising()?;
    wait_for_state(&gap, GapState::AdvertisingFast);
    sleep(low_power_after + Duration::from_millis(50));
    wait_for_state(&gap, GapState::AdvertisingLowPower);

    // ── 4. A central connects with a slow interval ────────────
    let slow = ConnectionParameters {
        interval: 0x50,
        slave_latency: 0,
        supervision_timeout: 400,
    };
    gap.notify(&packet::connection_complete(CONN_HANDLE, slow))?;
    gap.notify(&packet::l2cap_update_response(CONN_HANDLE, 0))?;
    let agreed = ConnectionParameters { interval: 0x18, ..slow };
    gap.notify(&packet::connection_update_complete(CONN_HANDLE, agreed))?;
    gap.notify(&packet::phy_update_complete(CONN_HANDLE, 0))?;

    // ── 5. Pairing ────────────────────────────────────────────
    gap.notify(&packet::pass_key_request(CONN_HANDLE))?;
    gap.notify(&packet::pairing_complete(CONN_HANDLE, 0))?;
    gap.notify(&packet::mtu_exchange(CONN_HANDLE, 247))?;

    let rssi = gap.remote_rssi();
    info!("sim: RSSI {} dBm, sampled {} ms ago", rssi.rssi, rssi.age_ms);
    info!("sim: {:?}", gap.diagnostics());

    // ── 6. The central leaves; advertising resumes ────────────
    gap.notify(&packet::disconnection_complete(CONN_HANDLE, 0x13))?;
    info!("sim: after disconnect {:?}", gap.state());

    // ── 7. Stop and shut down ─────────────────────────────────
    gap.stop_advertising()?;
    wait_for_state(&gap, GapState::Idle);
    gap.shutdown();

    info!("sim: {} controller commands issued", calls.snapshot().len());
    Ok(())
}
