//! Advertising and connection lifecycle through the public `Gap` API.

use std::sync::{Arc, Mutex, OnceLock, Weak, mpsc};
use std::thread;
use std::time::Duration;

use ble_gap::fsm::context::ConnectionParameters;
use ble_gap::hci::packet;
use ble_gap::{Gap, GapConfig, GapError, GapEvent, GapState, RemoteRssi};

use crate::mock_controller::{Cmd, MockController, MockHandle, Recorder, test_config, wait_for};

const HANDLE: u16 = 0x0801;

const IN_RANGE: ConnectionParameters = ConnectionParameters {
    interval: 0x10,
    slave_latency: 0,
    supervision_timeout: 400,
};

type TestGap = Gap<MockController, Recorder>;

fn make_gap() -> (TestGap, MockHandle, Recorder) {
    make_gap_with(test_config())
}

fn make_gap_with(config: GapConfig) -> (TestGap, MockHandle, Recorder) {
    let (controller, mock) = MockController::new();
    let recorder = Recorder::new(true);
    let gap = Gap::init(config, controller, recorder.clone()).unwrap();
    (gap, mock, recorder)
}

fn advertising_gap() -> (TestGap, MockHandle, Recorder) {
    advertising_gap_with(test_config())
}

fn advertising_gap_with(config: GapConfig) -> (TestGap, MockHandle, Recorder) {
    let (gap, mock, recorder) = make_gap_with(config);
    gap.start_advertising().unwrap();
    assert!(wait_for(|| recorder.events() == vec![GapEvent::StartAdvertising]));
    assert_eq!(gap.state(), GapState::AdvertisingFast);
    mock.clear();
    recorder.clear();
    (gap, mock, recorder)
}

fn connect(gap: &TestGap) {
    gap.notify(&packet::connection_complete(HANDLE, IN_RANGE)).unwrap();
    assert_eq!(gap.state(), GapState::Connected);
}

// ── Init ──────────────────────────────────────────────────────

#[test]
fn init_leaves_gap_idle() {
    let (gap, mock, recorder) = make_gap();
    assert_eq!(gap.state(), GapState::Idle);
    assert!(recorder.events().is_empty());
    assert_eq!(mock.calls().first(), Some(&Cmd::WriteConfigData(0x00)));
    assert_eq!(mock.calls().last(), Some(&Cmd::ConfigureWhitelist));
    assert!(gap.diagnostics().advertising_enabled);
}

#[test]
fn init_without_radio_fails() {
    let (mut controller, _) = MockController::new();
    controller.radio_ready = false;
    let r = Gap::init(test_config(), controller, Recorder::new(true));
    assert!(matches!(r, Err(GapError::RadioNotReady)));
}

#[test]
fn init_survives_controller_failures() {
    let (controller, mock) = MockController::new();
    mock.fail("gap_init");
    mock.fail("set_tx_power");
    let gap = Gap::init(test_config(), controller, Recorder::new(true)).unwrap();
    assert_eq!(gap.state(), GapState::Idle);
    // No handles: characteristic updates are skipped.
    assert_eq!(mock.count(|c| matches!(c, Cmd::UpdateCharValue(_))), 0);
    assert_eq!(mock.calls().last(), Some(&Cmd::ConfigureWhitelist));
}

// ── Advertising ───────────────────────────────────────────────

#[test]
fn start_advertising_enters_fast_mode() {
    let (gap, mock, recorder) = make_gap();
    mock.clear();
    gap.start_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::AdvertisingFast));
    assert!(wait_for(|| recorder.events() == vec![GapEvent::StartAdvertising]));
    assert_eq!(mock.calls()[0], Cmd::SetDiscoverable { interval_min: 0x80 });
}

#[test]
fn second_start_is_ignored() {
    let (gap, mock, recorder) = advertising_gap();
    gap.start_advertising().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(recorder.events().is_empty());
    assert_eq!(mock.count(|c| matches!(c, Cmd::SetDiscoverable { interval_min: 0x80 })), 0);
}

#[test]
fn fast_window_lapses_into_low_power() {
    let mut config = test_config();
    config.timings.fast_adv_window_ms = 40;
    let (gap, mock, recorder) = advertising_gap_with(config);
    assert!(wait_for(|| gap.state() == GapState::AdvertisingLowPower));
    assert!(wait_for(|| recorder.events() == vec![GapEvent::StartAdvertising]));
    let calls = mock.calls();
    assert_eq!(calls[0], Cmd::SetNonDiscoverable);
    assert_eq!(calls[1], Cmd::SetDiscoverable { interval_min: 0x640 });
}

#[test]
fn stop_advertising_returns_to_idle() {
    let (gap, mock, recorder) = advertising_gap();
    gap.stop_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::Idle));
    assert!(wait_for(|| recorder.events() == vec![GapEvent::StopAdvertising]));
    assert!(mock.calls().contains(&Cmd::SetNonDiscoverable));
    assert!(!gap.diagnostics().timer_armed);
}

#[test]
fn stop_when_idle_does_nothing() {
    let (gap, mock, recorder) = make_gap();
    mock.clear();
    gap.stop_advertising().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(recorder.events().is_empty());
    assert!(mock.calls().is_empty());
}

#[test]
fn advertising_survives_controller_failure() {
    let (controller, mock) = MockController::new();
    mock.fail("set_discoverable");
    let recorder = Recorder::new(true);
    let gap = Gap::init(test_config(), controller, recorder.clone()).unwrap();
    gap.start_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::AdvertisingFast));
    assert!(wait_for(|| recorder.events() == vec![GapEvent::StartAdvertising]));
}

// ── Connection ────────────────────────────────────────────────

#[test]
fn connection_stops_the_advertising_timer() {
    let (gap, mock, recorder) = advertising_gap();
    connect(&gap);
    assert!(!gap.diagnostics().timer_armed);
    // Well past the fast window: still connected.
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(gap.state(), GapState::Connected);
    assert!(recorder.events().is_empty());
    assert!(mock.calls().contains(&Cmd::SlaveSecurityRequest));
    assert_eq!(mock.count(|c| matches!(c, Cmd::ParamUpdate { .. })), 0);
}

#[test]
fn failed_connection_is_ignored() {
    let (gap, _, _) = advertising_gap();
    let mut pkt = packet::connection_complete(HANDLE, IN_RANGE);
    pkt[4] = 0x3E; // status
    gap.notify(&pkt).unwrap();
    assert_eq!(gap.state(), GapState::AdvertisingFast);
}

#[test]
fn disconnect_restarts_fast_advertising() {
    let (gap, mock, recorder) = advertising_gap();
    connect(&gap);
    mock.clear();
    gap.notify(&packet::disconnection_complete(HANDLE, 0x13)).unwrap();
    assert_eq!(gap.state(), GapState::AdvertisingFast);
    assert_eq!(
        recorder.events(),
        vec![GapEvent::StartAdvertising, GapEvent::Disconnected]
    );
    assert_eq!(mock.calls(), vec![Cmd::SetDiscoverable { interval_min: 0x80 }]);
    assert_eq!(gap.diagnostics().connection_handle, None);
}

#[test]
fn stop_while_connected_terminates_and_stays_idle() {
    let (gap, mock, recorder) = advertising_gap();
    connect(&gap);
    gap.stop_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::Idle));
    assert!(mock.calls().contains(&Cmd::Terminate {
        handle: HANDLE,
        reason: 0x13
    }));

    gap.notify(&packet::disconnection_complete(HANDLE, 0x16)).unwrap();
    assert_eq!(gap.state(), GapState::Idle);
    assert!(wait_for(|| recorder.events()
        == vec![GapEvent::StopAdvertising, GapEvent::Disconnected]));
}

#[test]
fn late_disconnect_keeps_new_advertising() {
    let (gap, mock, recorder) = advertising_gap();
    connect(&gap);
    gap.stop_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::Idle));
    gap.start_advertising().unwrap();
    assert!(wait_for(|| recorder.events()
        == vec![GapEvent::StopAdvertising, GapEvent::StartAdvertising]));
    mock.clear();
    recorder.clear();

    // The terminated link is only reported now.
    gap.notify(&packet::disconnection_complete(HANDLE, 0x16)).unwrap();
    assert_eq!(gap.state(), GapState::AdvertisingFast);
    assert_eq!(recorder.events(), vec![GapEvent::Disconnected]);
    assert!(mock.calls().is_empty());
    assert!(gap.diagnostics().timer_armed);
    assert_eq!(gap.diagnostics().connection_handle, None);

    gap.stop_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::Idle));
    assert!(mock.calls().contains(&Cmd::SetNonDiscoverable));
    assert!(!gap.diagnostics().timer_armed);
}

#[test]
fn remote_rssi_only_while_connected() {
    let (gap, _, _) = advertising_gap();
    assert_eq!(gap.remote_rssi(), RemoteRssi::NONE);
    connect(&gap);
    let rssi = gap.remote_rssi();
    assert_eq!(rssi.rssi, -42);
    assert!(rssi.age_ms >= 1);
}

#[test]
fn mtu_reported_without_att_header() {
    let (gap, _, recorder) = advertising_gap();
    connect(&gap);
    gap.notify(&packet::mtu_exchange(HANDLE, 247)).unwrap();
    assert_eq!(recorder.events(), vec![GapEvent::MtuNegotiated(244)]);
    assert_eq!(gap.diagnostics().mtu, Some(247));
}

#[test]
fn phy_update_reads_phy() {
    let (gap, mock, _) = advertising_gap();
    connect(&gap);
    gap.notify(&packet::phy_update_complete(HANDLE, 0)).unwrap();
    assert!(mock.calls().contains(&Cmd::ReadPhy));
    assert_eq!(gap.diagnostics().phy, Some((0x02, 0x01)));
}

// ── Shutdown ──────────────────────────────────────────────────

#[test]
fn shutdown_while_advertising_silences_everything() {
    let (gap, mock, recorder) = advertising_gap();
    gap.shutdown();
    assert_eq!(gap.state(), GapState::Uninitialized);
    mock.clear();

    gap.notify(&packet::connection_complete(HANDLE, IN_RANGE)).unwrap();
    std::thread::sleep(Duration::from_millis(400));
    assert!(recorder.events().is_empty());
    assert!(mock.calls().is_empty());
    assert_eq!(gap.start_advertising(), Err(GapError::ShutDown));
}

#[test]
fn drop_shuts_down() {
    let (gap, mock, _) = advertising_gap();
    drop(gap);
    mock.clear();
    std::thread::sleep(Duration::from_millis(400));
    assert!(mock.calls().is_empty());
}

#[test]
fn shutdown_drops_undelivered_events() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler: Boxed = {
        let seen = Arc::clone(&seen);
        Box::new(move |event| {
            seen.lock().unwrap().push(event);
            if event == GapEvent::MtuNegotiated(244) {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            }
            false
        })
    };

    let (controller, _) = MockController::new();
    let gap = Arc::new(Gap::init(test_config(), controller, handler).unwrap());
    gap.start_advertising().unwrap();
    assert!(wait_for(|| seen.lock().unwrap().len() == 1));
    gap.notify(&packet::connection_complete(HANDLE, IN_RANGE)).unwrap();

    // First delivery blocks inside the handler.
    let first = {
        let gap = Arc::clone(&gap);
        thread::spawn(move || gap.notify(&packet::mtu_exchange(HANDLE, 247)).unwrap())
    };
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    // Second one queues up behind it.
    let second = {
        let gap = Arc::clone(&gap);
        thread::spawn(move || gap.notify(&packet::mtu_exchange(HANDLE, 100)).unwrap())
    };
    thread::sleep(Duration::from_millis(50));

    let stopper = {
        let gap = Arc::clone(&gap);
        thread::spawn(move || gap.shutdown())
    };
    thread::sleep(Duration::from_millis(50));
    // The delivery in progress holds shutdown back.
    assert!(!stopper.is_finished());

    release_tx.send(()).unwrap();
    stopper.join().unwrap();
    first.join().unwrap();
    second.join().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![GapEvent::StartAdvertising, GapEvent::MtuNegotiated(244)]
    );
    assert_eq!(gap.state(), GapState::Uninitialized);
}

// ── Re-entrancy ───────────────────────────────────────────────

type Boxed = Box<dyn FnMut(GapEvent) -> bool + Send>;

#[test]
fn handler_may_query_and_command_gap() {
    let slot: Arc<OnceLock<Weak<Gap<MockController, Boxed>>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handler: Boxed = {
        let slot = Arc::clone(&slot);
        let seen = Arc::clone(&seen);
        Box::new(move |event| {
            if let Some(gap) = slot.get().and_then(Weak::upgrade) {
                seen.lock().unwrap().push((event, gap.state()));
                if event == GapEvent::StartAdvertising {
                    gap.stop_advertising().unwrap();
                }
            }
            false
        })
    };

    let (controller, _) = MockController::new();
    let gap = Arc::new(Gap::init(test_config(), controller, handler).unwrap());
    let _ = slot.set(Arc::downgrade(&gap));

    gap.start_advertising().unwrap();
    assert!(wait_for(|| seen.lock().unwrap().len() == 2));
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].0, GapEvent::StartAdvertising);
    assert_eq!(seen[1], (GapEvent::StopAdvertising, GapState::Idle));
    gap.shutdown();
}
