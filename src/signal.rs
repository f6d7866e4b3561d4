//! Operator stop requests

use eyre::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared flag set when the operator asks the run to stop
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag on Ctrl-C
    pub fn install_ctrlc(&self) -> Result<()> {
        let requested = self.requested.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStopping after the current event...");
            requested.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on a stop request
    ///
    /// Returns true if a stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        // `None` when the deadline is past what `Instant` can represent
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_requested() {
                return true;
            }
            let left = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    deadline - now
                }
                None => SLEEP_SLICE,
            };
            thread::sleep(left.min(SLEEP_SLICE));
        }
    }
}
