//! Simulated BLE controller.
//!
//! Accepts every command, logs it, and appends it to a shared
//! [`CallLog`] so a caller holding a clone of the log can inspect the
//! command history after the controller has been moved into the GAP core.
//! Used by the `gap-sim` binary and the unit tests.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::app::ports::{
    AuthRequirement, ConfigData, Controller, ControllerResult, DiscoverableParams,
    GapServiceHandles, IoCapability, PhyPreference,
};

/// One controller command, as recorded by [`SimController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    WriteConfigData { offset: u8, len: usize },
    SetTxPower { enable_high_power: bool, level: u8 },
    GattInit,
    GapInit { device_name_len: u8 },
    UpdateCharValue { characteristic: u16, value: Vec<u8> },
    SetDefaultPhy(PhyPreference),
    SetIoCapability(IoCapability),
    SetAuthenticationRequirement(AuthRequirement),
    ConfigureWhitelist,
    SetDiscoverable { interval_min: u16, interval_max: u16, local_name: Vec<u8> },
    SetNonDiscoverable,
    Terminate { handle: u16, reason: u8 },
    ConnectionParameterUpdateRequest { handle: u16, interval_min: u16, interval_max: u16 },
    ReadRssi { handle: u16 },
    ReadPhy { handle: u16 },
    SlaveSecurityRequest { handle: u16 },
    PassKeyResponse { handle: u16, pass_key: u32 },
    NumericComparisonConfirm { handle: u16, accept: bool },
    AllowRebond { handle: u16 },
}

/// Shared, append-only command history.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<ControllerCall>>>);

impl CallLog {
    pub fn snapshot(&self) -> Vec<ControllerCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn count(&self, pred: impl Fn(&ControllerCall) -> bool) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    fn push(&self, call: ControllerCall) {
        debug!("SIM controller: {call:?}");
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

/// GAP service attribute handles reported by the simulation.
pub const SIM_GAP_HANDLES: GapServiceHandles = GapServiceHandles {
    service: 0x0001,
    device_name: 0x0003,
    appearance: 0x0005,
};

pub struct SimController {
    radio_ready: bool,
    rssi: i8,
    phy: (u8, u8),
    log: CallLog,
}

impl Default for SimController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimController {
    pub fn new() -> Self {
        Self {
            radio_ready: true,
            rssi: -60,
            phy: (0x02, 0x02),
            log: CallLog::default(),
        }
    }

    /// Radio stack that never finishes start-up.
    pub fn not_ready() -> Self {
        Self {
            radio_ready: false,
            ..Self::new()
        }
    }

    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = rssi;
        self
    }

    /// Handle on the command history.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Controller for SimController {
    fn is_radio_ready(&self) -> bool {
        self.radio_ready
    }

    fn write_config_data(&mut self, data: &ConfigData) -> ControllerResult {
        self.log.push(ControllerCall::WriteConfigData {
            offset: data.offset(),
            len: data.bytes().len(),
        });
        Ok(())
    }

    fn set_tx_power(&mut self, enable_high_power: bool, level: u8) -> ControllerResult {
        self.log.push(ControllerCall::SetTxPower {
            enable_high_power,
            level,
        });
        Ok(())
    }

    fn gatt_init(&mut self) -> ControllerResult {
        self.log.push(ControllerCall::GattInit);
        Ok(())
    }

    fn gap_init(&mut self, device_name_len: u8) -> ControllerResult<GapServiceHandles> {
        self.log.push(ControllerCall::GapInit { device_name_len });
        Ok(SIM_GAP_HANDLES)
    }

    fn update_char_value(
        &mut self,
        _service: u16,
        characteristic: u16,
        value: &[u8],
    ) -> ControllerResult {
        self.log.push(ControllerCall::UpdateCharValue {
            characteristic,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn set_default_phy(&mut self, preference: PhyPreference) -> ControllerResult {
        self.log.push(ControllerCall::SetDefaultPhy(preference));
        Ok(())
    }

    fn set_io_capability(&mut self, capability: IoCapability) -> ControllerResult {
        self.log.push(ControllerCall::SetIoCapability(capability));
        Ok(())
    }

    fn set_authentication_requirement(&mut self, requirement: &AuthRequirement) -> ControllerResult {
        self.log
            .push(ControllerCall::SetAuthenticationRequirement(*requirement));
        Ok(())
    }

    fn configure_whitelist(&mut self) -> ControllerResult {
        self.log.push(ControllerCall::ConfigureWhitelist);
        Ok(())
    }

    fn set_discoverable(&mut self, params: &DiscoverableParams<'_>) -> ControllerResult {
        self.log.push(ControllerCall::SetDiscoverable {
            interval_min: params.interval_min,
            interval_max: params.interval_max,
            local_name: params.local_name.to_vec(),
        });
        Ok(())
    }

    fn set_non_discoverable(&mut self) -> ControllerResult {
        self.log.push(ControllerCall::SetNonDiscoverable);
        Ok(())
    }

    fn terminate(&mut self, handle: u16, reason: u8) -> ControllerResult {
        self.log.push(ControllerCall::Terminate { handle, reason });
        Ok(())
    }

    fn connection_parameter_update_request(
        &mut self,
        handle: u16,
        interval_min: u16,
        interval_max: u16,
        _slave_latency: u16,
        _supervision_timeout: u16,
    ) -> ControllerResult {
        self.log.push(ControllerCall::ConnectionParameterUpdateRequest {
            handle,
            interval_min,
            interval_max,
        });
        Ok(())
    }

    fn read_rssi(&mut self, handle: u16) -> ControllerResult<i8> {
        self.log.push(ControllerCall::ReadRssi { handle });
        Ok(self.rssi)
    }

    fn read_phy(&mut self, handle: u16) -> ControllerResult<(u8, u8)> {
        self.log.push(ControllerCall::ReadPhy { handle });
        Ok(self.phy)
    }

    fn slave_security_request(&mut self, handle: u16) -> ControllerResult {
        self.log.push(ControllerCall::SlaveSecurityRequest { handle });
        Ok(())
    }

    fn pass_key_response(&mut self, handle: u16, pass_key: u32) -> ControllerResult {
        self.log
            .push(ControllerCall::PassKeyResponse { handle, pass_key });
        Ok(())
    }

    fn numeric_comparison_confirm(&mut self, handle: u16, accept: bool) -> ControllerResult {
        self.log
            .push(ControllerCall::NumericComparisonConfirm { handle, accept });
        Ok(())
    }

    fn allow_rebond(&mut self, handle: u16) -> ControllerResult {
        self.log.push(ControllerCall::AllowRebond { handle });
        Ok(())
    }
}
