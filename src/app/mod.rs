//! Application boundary: the types that cross between the GAP core and
//! its collaborators.
//!
//! Inbound work ([`commands`]), outbound notifications ([`events`]) and the
//! port traits ([`ports`]) that connect the core to the controller and to
//! the application, keeping the core testable with mock adapters.

pub mod commands;
pub mod events;
pub mod ports;
