//! Per-tick drain driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::error;

use crate::bus::EventBus;
use crate::event::EventResult;

/// Owns a bus's drain cadence.
///
/// Exactly one driver should exist per bus; [`tick`](TickDriver::tick) is
/// the single once-per-tick drain call site. Embed the driver into an
/// application's update loop, or hand it to a dedicated thread with
/// [`spawn`](TickDriver::spawn).
pub struct TickDriver {
    bus: EventBus,
}

impl TickDriver {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Runs one tick: promotes due delayed events and drains the queue.
    ///
    /// Propagates the first handler failure of the tick to the caller.
    pub fn tick(&mut self) -> EventResult<()> {
        self.bus.drain()
    }

    /// The driven bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Moves the driver onto a dedicated thread that drains at a fixed
    /// interval until the returned handle is stopped or dropped.
    ///
    /// Handler failures are logged and do not stop the loop.
    pub fn spawn(mut self, interval: Duration) -> DriverHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = thread::spawn(move || {
            while !stop_flag.load(Ordering::Acquire) {
                if let Err(err) = self.tick() {
                    error!(%err, "handler failed during driven drain");
                }
                thread::sleep(interval);
            }
        });
        DriverHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Stop handle for a spawned driver thread.
pub struct DriverHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Signals the driver loop to exit and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
