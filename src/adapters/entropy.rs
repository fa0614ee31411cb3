//! Pass-key entropy.
//!
//! Pass keys only have to be unpredictable to a casual observer for the
//! few seconds a pairing takes; they are not key material.
//!
//! - **`target_os = "espidf"`**: `esp_fill_random()` (hardware RNG).
//! - **`not(target_os = "espidf")`**: `rand::thread_rng()`.

/// Largest 6-digit pass key.
pub const MAX_PIN: u32 = 999_999;

/// Uniformly random pass key in `0..=999_999`.
#[cfg(target_os = "espidf")]
pub fn random_pin() -> u32 {
    // Rejection sampling keeps the distribution uniform.
    const ZONE: u32 = u32::MAX - (u32::MAX % (MAX_PIN + 1));
    loop {
        let mut buf = [0u8; 4];
        unsafe {
            esp_idf_svc::sys::esp_fill_random(buf.as_mut_ptr().cast(), buf.len());
        }
        let v = u32::from_le_bytes(buf);
        if v < ZONE {
            return v % (MAX_PIN + 1);
        }
    }
}

/// Uniformly random pass key in `0..=999_999`.
#[cfg(not(target_os = "espidf"))]
pub fn random_pin() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..=MAX_PIN)
}
