//! Advertising identity.
//!
//! Built once per [`Gap::init`](crate::gap::Gap::init) from the config and
//! the device's unique number, never persisted:
//!
//! ```text
//!   legacy advertising payload (31 bytes max)
//!   ┌───────────┬──────────────────────┬───────────────────────┐
//!   │ flags (3) │ len │ 0x09 │ name    │ len │ 0x02/04/07 │ uuid │
//!   └───────────┴──────────────────────┴───────────────────────┘
//! ```
//!
//! When the complete name does not fit next to the UUID block it is cut
//! and advertised as a shortened local name (0x08).  The GAP device-name
//! characteristic always carries the full name.

use heapless::{String, Vec};
use log::warn;

use crate::config::{GapConfig, MAX_NAME_LEN, ServiceUuid};
use crate::error::ConfigError;

/// Legacy advertising payload capacity.
pub const ADV_PAYLOAD_MAX: usize = 31;
/// Flags AD structure emitted by the controller (len, type, value).
const FLAGS_AD_LEN: usize = 3;
/// Length and type bytes of the name AD structure.
const AD_OVERHEAD: usize = 2;

pub const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const AD_TYPE_16_BIT_SERV_UUID: u8 = 0x02;
pub const AD_TYPE_32_BIT_SERV_UUID: u8 = 0x04;
pub const AD_TYPE_128_BIT_SERV_UUID_CMPLT_LIST: u8 = 0x07;

/// Upper 16 bits of the static random address; top two bits set.
const STATIC_ADDR_HIGH: u16 = 0xED6E;

/// AD type byte followed by up to 32 bytes of data.
pub type AdBlock = Vec<u8, { MAX_NAME_LEN + 1 }>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingIdentity {
    /// Full device name for the GAP characteristic.
    pub device_name: String<MAX_NAME_LEN>,
    /// Name AD payload, AD type first.
    pub local_name: AdBlock,
    /// Service UUID AD payload, AD type first.
    pub service_uuids: AdBlock,
    pub appearance: u16,
    /// Static random address, least-significant byte first.
    pub static_address: [u8; 6],
}

impl AdvertisingIdentity {
    pub fn build(config: &GapConfig, unique_id: u32) -> Result<Self, ConfigError> {
        let service_uuids = uuid_block(&config.adv_service_uuid);

        let budget =
            ADV_PAYLOAD_MAX - FLAGS_AD_LEN - AD_OVERHEAD - (1 + service_uuids.len());
        let name = config.name.as_str();
        let (ad_type, advertised) = if name.len() <= budget {
            (AD_TYPE_COMPLETE_LOCAL_NAME, name)
        } else {
            let cut = truncate_to_boundary(name, budget);
            if cut.is_empty() {
                return Err(ConfigError::AdvertisingDataTooLong);
            }
            warn!(
                "GAP: name '{name}' does not fit next to the service UUID, advertising '{cut}'"
            );
            (AD_TYPE_SHORTENED_LOCAL_NAME, cut)
        };

        let mut local_name = AdBlock::new();
        // Both fit: budget < MAX_NAME_LEN + 1.
        let _ = local_name.push(ad_type);
        let _ = local_name.extend_from_slice(advertised.as_bytes());

        Ok(Self {
            device_name: config.name.clone(),
            local_name,
            service_uuids,
            appearance: config.appearance,
            static_address: static_random_address(unique_id),
        })
    }

    /// Bytes the name and UUID structures occupy in the payload, flags
    /// included.
    pub fn payload_len(&self) -> usize {
        FLAGS_AD_LEN + (1 + self.local_name.len()) + (1 + self.service_uuids.len())
    }

    pub fn is_name_shortened(&self) -> bool {
        self.local_name.first() == Some(&AD_TYPE_SHORTENED_LOCAL_NAME)
    }
}

/// Static random address: low 32 bits from the device's unique number,
/// fixed upper bits.
pub fn static_random_address(unique_id: u32) -> [u8; 6] {
    let low = unique_id.to_le_bytes();
    let high = STATIC_ADDR_HIGH.to_le_bytes();
    [low[0], low[1], low[2], low[3], high[0], high[1]]
}

fn uuid_block(uuid: &ServiceUuid) -> AdBlock {
    let mut block = AdBlock::new();
    // At most 17 bytes.
    let _ = match uuid {
        ServiceUuid::Uuid16(v) => {
            let _ = block.push(AD_TYPE_16_BIT_SERV_UUID);
            block.extend_from_slice(&v.to_le_bytes())
        }
        ServiceUuid::Uuid32(v) => {
            let _ = block.push(AD_TYPE_32_BIT_SERV_UUID);
            block.extend_from_slice(&v.to_le_bytes())
        }
        ServiceUuid::Uuid128(v) => {
            let _ = block.push(AD_TYPE_128_BIT_SERV_UUID_CMPLT_LIST);
            block.extend_from_slice(v)
        }
    };
    block
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
