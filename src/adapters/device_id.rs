//! Device identity derived from the factory MAC address.
//!
//! The static random BLE address takes its low 32 bits from this value,
//! so it must be stable across reboots and differ between devices.

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Unique device number: the device-specific low 32 bits of the MAC.
pub fn unique_id(mac: &MacAddress) -> u32 {
    u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]])
}

/// Unique device number of this device.
pub fn read_unique_id() -> u32 {
    unique_id(&read_mac())
}
