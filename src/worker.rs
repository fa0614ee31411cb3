//! Command queue and worker thread.
//!
//! ```text
//! ┌──────────────┐                          ┌────────────────────┐
//! │  Gap API     │──┐   GapCommand (≤ 8)    │   gap-worker       │
//! └──────────────┘  ├─▶ ═══════════════ ──▶ │  block_on(receive) │
//! ┌──────────────┐  │   embassy Channel     │  apply(cmd) under  │
//! │  adv timer   │──┘                       │  the state lock    │
//! └──────────────┘                          └────────────────────┘
//! ```
//!
//! Producers never block: a full queue means a producer is misbehaving
//! (the API guards and the single timer bound the number of commands in
//! flight) and is reported as [`GapError::QueueFull`].  The only blocking
//! send is the final `Shutdown`, which must not be lost.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future::block_on;
use log::{debug, error, info};

use crate::app::commands::GapCommand;
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::error::{GapError, Result};

/// Queue depth.
pub const QUEUE_DEPTH: usize = 8;

/// FIFO of pending commands, shared by every producer and the worker.
pub type CommandQueue = Channel<CriticalSectionRawMutex, GapCommand, QUEUE_DEPTH>;

const WORKER_TASK: TaskSpec = TaskSpec {
    name: "gap-worker\0",
    core: Core::Pro,
    priority: 5,
    stack_kb: 8,
};

/// Enqueue without blocking.
pub fn post(queue: &CommandQueue, command: GapCommand) -> Result<()> {
    queue.try_send(command).map_err(|_| {
        error!("GAP: command queue full, dropping {command:?}");
        GapError::QueueFull
    })
}

/// Enqueue `Shutdown`, waiting for room if the queue is full.
pub fn post_shutdown(queue: &CommandQueue) {
    block_on(queue.send(GapCommand::Shutdown));
}

/// Start the worker.  `apply` runs once per dequeued command, in FIFO
/// order, until `Shutdown` is received.
pub fn spawn(
    queue: Arc<CommandQueue>,
    mut apply: impl FnMut(GapCommand) + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    task_pin::spawn(WORKER_TASK, move || {
        info!("GAP worker: started");
        loop {
            let command = block_on(queue.receive());
            debug!("GAP worker: {command:?}");
            if command == GapCommand::Shutdown {
                break;
            }
            apply(command);
        }
        info!("GAP worker: stopped");
    })
}
