//! Fuzz target: `hci::decode` followed by the event translator.
//!
//! The input is a sequence of length-prefixed packets; every packet that
//! decodes is applied to a simulated GAP core.
//! Neither step may panic, and the core must stay initialised.
//!
//! cargo fuzz run fuzz_hci_decoder

#![no_main]

use std::sync::Arc;

use ble_gap::adapters::sim_controller::SimController;
use ble_gap::fsm::{GapCore, GapState, Outbox};
use ble_gap::hci;
use ble_gap::identity::AdvertisingIdentity;
use ble_gap::timer::AdvertisingTimer;
use ble_gap::translator::translate;
use ble_gap::GapConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut config = GapConfig::default();
    config.timings.disconnect_settle_us = 0;
    let Ok(identity) = AdvertisingIdentity::build(&config, 0xBEEF_CAFE) else {
        return;
    };
    let mut core = GapCore::new(
        SimController::new(),
        config,
        identity,
        Arc::new(AdvertisingTimer::new()),
    );

    let mut rest = data;
    while let [len, tail @ ..] = rest {
        let (packet, next) = tail.split_at(usize::from(*len).min(tail.len()));
        rest = next;
        let Ok(event) = hci::decode(packet) else {
            continue;
        };
        let mut out = Outbox::new();
        translate(&mut core, event, &mut out);
        assert_ne!(core.state(), GapState::Uninitialized);
    }
});
