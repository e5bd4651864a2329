use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::DeviceSource;

// sleep granularity while waiting, so a stop request is seen promptly
const STOP_POLL: Duration = Duration::from_millis(50);

/// Discard-read protocol run before the first trusted frame.
///
/// Many devices auto-expose and auto-white-balance over their first frames,
/// so we wait `settle_ms`, then throw away `discard_reads` frames spaced
/// `interval_ms` apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Warmup {
    pub settle_ms: u64,
    pub discard_reads: u32,
    pub interval_ms: u64,
}

impl Default for Warmup {
    fn default() -> Self {
        Self {
            settle_ms: 2000,
            discard_reads: 5,
            interval_ms: 200,
        }
    }
}

impl Warmup {
    /// No delay, no discarded reads.
    pub fn none() -> Self {
        Self {
            settle_ms: 0,
            discard_reads: 0,
            interval_ms: 0,
        }
    }

    /// Run the protocol. Read errors are ignored. Returns `false` when
    /// `stop` was raised before the protocol finished.
    pub fn run<S: DeviceSource + ?Sized>(&self, source: &mut S, stop: &AtomicBool) -> bool {
        info!(
            "warming up camera ({} ms settle, {} discarded reads)",
            self.settle_ms, self.discard_reads
        );
        if !sleep_unless_stopped(Duration::from_millis(self.settle_ms), stop) {
            return false;
        }
        for i in 0..self.discard_reads {
            if stop.load(Ordering::Acquire) {
                return false;
            }
            match source.read() {
                Ok(frame) => debug!(
                    "warm-up read {}/{} discarded ({}x{})",
                    i + 1,
                    self.discard_reads,
                    frame.width(),
                    frame.height()
                ),
                Err(e) => debug!("warm-up read {}/{} failed: {e}", i + 1, self.discard_reads),
            }
            if !sleep_unless_stopped(Duration::from_millis(self.interval_ms), stop) {
                return false;
            }
        }
        !stop.load(Ordering::Acquire)
    }
}

/// Sleep for `total`, waking early when `stop` is raised.
pub fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}
