//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below exercises the public `Gap` API end to end against a
//! recording mock controller.  Everything runs on the host with short
//! advertising windows so the timer thread fires within a test.

mod lifecycle_tests;
mod mock_controller;
mod pairing_tests;
