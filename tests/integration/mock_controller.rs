//! Mock controller and event recorder for integration tests.
//!
//! Records every controller command so tests can assert on the full
//! command history, and fails selected commands on demand.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ble_gap::app::ports::{
    AuthRequirement, ConfigData, Controller, ControllerResult, DiscoverableParams,
    GapServiceHandles, IoCapability, PhyPreference,
};
use ble_gap::error::ControllerStatus;
use ble_gap::{GapConfig, GapEvent};

// ── Command record ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    WriteConfigData(u8),
    SetTxPower,
    GattInit,
    GapInit,
    UpdateCharValue(u16),
    SetDefaultPhy,
    SetIoCapability(IoCapability),
    SetAuthRequirement { bonding: bool, mitm: bool },
    ConfigureWhitelist,
    SetDiscoverable { interval_min: u16 },
    SetNonDiscoverable,
    Terminate { handle: u16, reason: u8 },
    ParamUpdate { handle: u16, min: u16, max: u16 },
    ReadRssi,
    ReadPhy,
    SlaveSecurityRequest,
    PassKey(u32),
    Confirm(bool),
    AllowRebond,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Cmd>,
    failing: Vec<&'static str>,
}

/// Shared view of a [`MockController`] that stays with the test after the
/// controller moves into `Gap`.
#[derive(Clone, Default)]
pub struct MockHandle(Arc<Mutex<Inner>>);

#[allow(dead_code)]
impl MockHandle {
    pub fn calls(&self) -> Vec<Cmd> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Cmd) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).calls.clear();
    }

    /// Make every later call to `command` return status 0x0C.
    pub fn fail(&self, command: &'static str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing
            .push(command);
    }
}

// ── MockController ────────────────────────────────────────────

pub struct MockController {
    handle: MockHandle,
    pub radio_ready: bool,
    pub rssi: i8,
}

#[allow(dead_code)]
impl MockController {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        let controller = Self {
            handle: handle.clone(),
            radio_ready: true,
            rssi: -42,
        };
        (controller, handle)
    }

    fn record(&self, name: &'static str, cmd: Cmd) -> ControllerResult {
        let mut inner = self.handle.0.lock().unwrap_or_else(PoisonError::into_inner);
        inner.calls.push(cmd);
        if inner.failing.contains(&name) {
            return Err(ControllerStatus(0x0C));
        }
        Ok(())
    }
}

impl Controller for MockController {
    fn is_radio_ready(&self) -> bool {
        self.radio_ready
    }

    fn write_config_data(&mut self, data: &ConfigData) -> ControllerResult {
        self.record("write_config_data", Cmd::WriteConfigData(data.offset()))
    }

    fn set_tx_power(&mut self, _high: bool, _level: u8) -> ControllerResult {
        self.record("set_tx_power", Cmd::SetTxPower)
    }

    fn gatt_init(&mut self) -> ControllerResult {
        self.record("gatt_init", Cmd::GattInit)
    }

    fn gap_init(&mut self, _len: u8) -> ControllerResult<GapServiceHandles> {
        self.record("gap_init", Cmd::GapInit)?;
        Ok(GapServiceHandles {
            service: 0x10,
            device_name: 0x12,
            appearance: 0x14,
        })
    }

    fn update_char_value(&mut self, _service: u16, characteristic: u16, _value: &[u8]) -> ControllerResult {
        self.record("update_char_value", Cmd::UpdateCharValue(characteristic))
    }

    fn set_default_phy(&mut self, _preference: PhyPreference) -> ControllerResult {
        self.record("set_default_phy", Cmd::SetDefaultPhy)
    }

    fn set_io_capability(&mut self, capability: IoCapability) -> ControllerResult {
        self.record("set_io_capability", Cmd::SetIoCapability(capability))
    }

    fn set_authentication_requirement(&mut self, r: &AuthRequirement) -> ControllerResult {
        self.record(
            "set_authentication_requirement",
            Cmd::SetAuthRequirement {
                bonding: r.bonding,
                mitm: r.mitm,
            },
        )
    }

    fn configure_whitelist(&mut self) -> ControllerResult {
        self.record("configure_whitelist", Cmd::ConfigureWhitelist)
    }

    fn set_discoverable(&mut self, params: &DiscoverableParams<'_>) -> ControllerResult {
        self.record(
            "set_discoverable",
            Cmd::SetDiscoverable {
                interval_min: params.interval_min,
            },
        )
    }

    fn set_non_discoverable(&mut self) -> ControllerResult {
        self.record("set_non_discoverable", Cmd::SetNonDiscoverable)
    }

    fn terminate(&mut self, handle: u16, reason: u8) -> ControllerResult {
        self.record("terminate", Cmd::Terminate { handle, reason })
    }

    fn connection_parameter_update_request(
        &mut self,
        handle: u16,
        interval_min: u16,
        interval_max: u16,
        _slave_latency: u16,
        _supervision_timeout: u16,
    ) -> ControllerResult {
        self.record(
            "connection_parameter_update_request",
            Cmd::ParamUpdate {
                handle,
                min: interval_min,
                max: interval_max,
            },
        )
    }

    fn read_rssi(&mut self, _handle: u16) -> ControllerResult<i8> {
        self.record("read_rssi", Cmd::ReadRssi)?;
        Ok(self.rssi)
    }

    fn read_phy(&mut self, _handle: u16) -> ControllerResult<(u8, u8)> {
        self.record("read_phy", Cmd::ReadPhy)?;
        Ok((0x02, 0x01))
    }

    fn slave_security_request(&mut self, _handle: u16) -> ControllerResult {
        self.record("slave_security_request", Cmd::SlaveSecurityRequest)
    }

    fn pass_key_response(&mut self, _handle: u16, pass_key: u32) -> ControllerResult {
        self.record("pass_key_response", Cmd::PassKey(pass_key))
    }

    fn numeric_comparison_confirm(&mut self, _handle: u16, accept: bool) -> ControllerResult {
        self.record("numeric_comparison_confirm", Cmd::Confirm(accept))
    }

    fn allow_rebond(&mut self, _handle: u16) -> ControllerResult {
        self.record("allow_rebond", Cmd::AllowRebond)
    }
}

// ── Event recorder ────────────────────────────────────────────

/// Event handler that records everything and answers numeric comparisons
/// with a fixed verdict.
#[derive(Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<GapEvent>>>,
    accept: bool,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new(accept: bool) -> Self {
        Self {
            events: Arc::default(),
            accept,
        }
    }

    pub fn events(&self) -> Vec<GapEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl ble_gap::GapEventHandler for Recorder {
    fn on_event(&mut self, event: GapEvent) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        matches!(event, GapEvent::PinCodeVerify(_)) && self.accept
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Default configuration with timings short enough for tests.
#[allow(dead_code)]
pub fn test_config() -> GapConfig {
    let mut config = GapConfig::named("Test Peripheral").unwrap();
    config.timings.fast_adv_window_ms = 250;
    config.timings.disconnect_settle_us = 0;
    config
}

/// Poll `cond` for up to two seconds.
#[allow(dead_code)]
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
