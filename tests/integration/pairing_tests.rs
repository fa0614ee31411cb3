//! Pairing flows: pass key display, numeric comparison, bonding and
//! connection parameter supervision.

use ble_gap::app::ports::IoCapability;
use ble_gap::fsm::context::ConnectionParameters;
use ble_gap::hci::packet;
use ble_gap::{Gap, GapConfig, GapEvent, GapState, PairingMethod};

use crate::mock_controller::{Cmd, MockController, MockHandle, Recorder, test_config, wait_for};

const HANDLE: u16 = 0x0042;

fn params(interval: u16) -> ConnectionParameters {
    ConnectionParameters {
        interval,
        slave_latency: 0,
        supervision_timeout: 600,
    }
}

fn connected_gap(
    config: GapConfig,
    accept: bool,
) -> (Gap<MockController, Recorder>, MockHandle, Recorder) {
    let (controller, mock) = MockController::new();
    let recorder = Recorder::new(accept);
    let gap = Gap::init(config, controller, recorder.clone()).unwrap();
    gap.start_advertising().unwrap();
    assert!(wait_for(|| recorder.events() == vec![GapEvent::StartAdvertising]));
    gap.notify(&packet::connection_complete(HANDLE, params(0x10)))
        .unwrap();
    mock.clear();
    recorder.clear();
    (gap, mock, recorder)
}

// ── Pass key display ──────────────────────────────────────────

#[test]
fn pass_key_shown_and_answered() {
    let (gap, mock, recorder) = connected_gap(test_config(), true);
    gap.notify(&packet::pass_key_request(HANDLE)).unwrap();

    let events = recorder.events();
    let [GapEvent::PinCodeShow(pin)] = events.as_slice() else {
        panic!("expected one PinCodeShow, got {events:?}");
    };
    assert!(*pin <= 999_999);
    assert_eq!(mock.calls(), vec![Cmd::PassKey(*pin)]);
}

#[test]
fn hidden_pin_still_reaches_the_application() {
    let mut config = test_config();
    config.hide_pin_in_logs = true;
    let (gap, mock, recorder) = connected_gap(config, true);
    gap.notify(&packet::pass_key_request(HANDLE)).unwrap();
    assert_eq!(recorder.events().len(), 1);
    assert_eq!(mock.count(|c| matches!(c, Cmd::PassKey(_))), 1);
}

// ── Numeric comparison ────────────────────────────────────────

#[test]
fn numeric_comparison_accepted() {
    let (gap, mock, recorder) = connected_gap(test_config(), true);
    gap.notify(&packet::numeric_comparison(HANDLE, 123_456)).unwrap();
    assert_eq!(recorder.events(), vec![GapEvent::PinCodeVerify(123_456)]);
    assert_eq!(mock.calls(), vec![Cmd::Confirm(true)]);
}

#[test]
fn numeric_comparison_rejected() {
    let (gap, mock, recorder) = connected_gap(test_config(), false);
    gap.notify(&packet::numeric_comparison(HANDLE, 42)).unwrap();
    assert_eq!(recorder.events(), vec![GapEvent::PinCodeVerify(42)]);
    assert_eq!(mock.calls(), vec![Cmd::Confirm(false)]);
}

// ── Pairing outcome ───────────────────────────────────────────

#[test]
fn pairing_success_reports_connected() {
    let (gap, mock, recorder) = connected_gap(test_config(), true);
    gap.notify(&packet::pairing_complete(HANDLE, 0x00)).unwrap();
    assert_eq!(recorder.events(), vec![GapEvent::Connected]);
    assert_eq!(mock.calls(), vec![Cmd::ReadRssi]);
    assert_eq!(gap.state(), GapState::Connected);
}

#[test]
fn pairing_failure_terminates_link() {
    let (gap, mock, recorder) = connected_gap(test_config(), true);
    gap.notify(&packet::pairing_complete(HANDLE, 0x02)).unwrap();
    assert!(recorder.events().is_empty());
    assert_eq!(
        mock.calls(),
        vec![Cmd::Terminate {
            handle: HANDLE,
            reason: 0x05
        }]
    );

    // The controller then reports the disconnect; advertising resumes.
    gap.notify(&packet::disconnection_complete(HANDLE, 0x05)).unwrap();
    assert_eq!(gap.state(), GapState::AdvertisingFast);
    assert_eq!(
        recorder.events(),
        vec![GapEvent::StartAdvertising, GapEvent::Disconnected]
    );
}

#[test]
fn bond_lost_allows_rebond() {
    let (gap, mock, recorder) = connected_gap(test_config(), true);
    gap.notify(&packet::bond_lost()).unwrap();
    assert_eq!(mock.calls(), vec![Cmd::AllowRebond]);
    assert!(recorder.events().is_empty());
}

// ── Full scenarios ────────────────────────────────────────────

#[test]
fn yes_no_bonding_with_slow_central() {
    let mut config = test_config();
    config.pairing_method = PairingMethod::PinCodeVerifyYesNo;
    config.bonding = true;

    let (controller, mock) = MockController::new();
    let recorder = Recorder::new(true);
    let gap = Gap::init(config, controller, recorder.clone()).unwrap();
    assert!(mock.calls().contains(&Cmd::SetIoCapability(IoCapability::DisplayYesNo)));
    assert!(mock.calls().contains(&Cmd::SetAuthRequirement {
        bonding: true,
        mitm: true
    }));

    gap.start_advertising().unwrap();
    assert!(wait_for(|| gap.state() == GapState::AdvertisingFast));
    mock.clear();

    // 100 ms interval is outside 7.5–45 ms: an update is requested.
    gap.notify(&packet::connection_complete(HANDLE, params(0x50)))
        .unwrap();
    assert!(mock.calls().contains(&Cmd::ParamUpdate {
        handle: HANDLE,
        min: 0x06,
        max: 0x24
    }));
    gap.notify(&packet::l2cap_update_response(HANDLE, 0)).unwrap();
    mock.clear();
    gap.notify(&packet::connection_update_complete(HANDLE, params(0x20)))
        .unwrap();
    assert_eq!(mock.count(|c| matches!(c, Cmd::ParamUpdate { .. })), 0);

    gap.notify(&packet::numeric_comparison(HANDLE, 654_321)).unwrap();
    gap.notify(&packet::pairing_complete(HANDLE, 0x00)).unwrap();
    gap.notify(&packet::mtu_exchange(HANDLE, 185)).unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            GapEvent::StartAdvertising,
            GapEvent::PinCodeVerify(654_321),
            GapEvent::Connected,
            GapEvent::MtuNegotiated(182),
        ]
    );
    assert!(mock.calls().contains(&Cmd::Confirm(true)));
    let diag = gap.diagnostics();
    assert_eq!(diag.params.interval, 0x20);
    assert_eq!(diag.connection_handle, Some(HANDLE));
}

#[test]
fn just_works_disables_mitm_and_bonding() {
    let mut config = test_config();
    config.pairing_method = PairingMethod::None;
    let (controller, mock) = MockController::new();
    let gap = Gap::init(config, controller, Recorder::new(true)).unwrap();
    assert!(mock.calls().contains(&Cmd::SetAuthRequirement {
        bonding: false,
        mitm: false
    }));
    assert!(!gap.security_policy().bonding);
}
