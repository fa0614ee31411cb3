//! Commands posted to the GAP worker queue.
//!
//! Producers are the public API ([`Gap`](crate::gap::Gap)) and the
//! advertising timer.  The single consumer is the worker thread, which
//! applies each command under the state lock in FIFO order.

/// Work items for the GAP worker thread.  Plain data, never closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapCommand {
    /// Start (or restart) advertising with the fast interval.
    AdvertiseFast,
    /// Switch to the low-power advertising interval.  Posted by the timer.
    AdvertiseLowPower,
    /// Stop advertising and drop any connection.
    AdvertiseStop,
    /// Terminate the worker loop.
    Shutdown,
}
