//! Adapters: platform services and a simulated controller.
//!
//! | Adapter          | Provides                  | Backed by (espidf / host)        |
//! |------------------|---------------------------|----------------------------------|
//! | `device_id`      | unique device number      | eFuse MAC / fixed fake MAC       |
//! | `entropy`        | random pass keys          | `esp_fill_random` / `rand`       |
//! | `time`           | monotonic milliseconds    | `esp_timer_get_time` / `Instant` |
//! | `sim_controller` | `Controller` port         | logging simulation               |

pub mod device_id;
pub mod entropy;
pub mod sim_controller;
pub mod time;
