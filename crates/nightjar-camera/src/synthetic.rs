//! In-memory device source.
//!
//! Stands in for real hardware in tests and on machines without a camera
//! (`--device synthetic`). Failures can be scripted by read index, and the
//! shared counters let a test observe reads, closes and register writes
//! after the source has been moved into the capture thread.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use log::debug;

use crate::{
    ActualGeometry, CameraError, CaptureRequest, DeviceSource, ExposureSettings, Frame, Result,
};

/// What the synthetic sensor "sees".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Solid([u8; 3]),
    /// Horizontal red ramp, vertical green ramp, constant blue.
    Gradient,
}

/// Which reads fail, by zero-based read index (warm-up reads included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePlan {
    Never,
    Always,
    /// Reads `start .. start + len` fail, everything else succeeds.
    Window { start: u64, len: u64 },
}

impl FailurePlan {
    fn fails(&self, index: u64) -> bool {
        match *self {
            FailurePlan::Never => false,
            FailurePlan::Always => true,
            FailurePlan::Window { start, len } => index >= start && index < start + len,
        }
    }
}

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    pattern: Pattern,
    failures: FailurePlan,
    frame_interval: Duration,
    reads: Arc<AtomicU64>,
    closes: Arc<AtomicUsize>,
    exposures: Arc<Mutex<Vec<ExposureSettings>>>,
}

impl SyntheticCamera {
    /// A source with a fixed sensor geometry; `configure` cannot change it.
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        Self {
            width,
            height,
            pattern,
            failures: FailurePlan::Never,
            frame_interval: Duration::ZERO,
            reads: Arc::new(AtomicU64::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            exposures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failures(mut self, plan: FailurePlan) -> Self {
        self.failures = plan;
        self
    }

    /// Block this long in every `read`, like a sensor running at a fixed rate.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Total `read` calls so far, successful or not.
    pub fn read_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.reads)
    }

    /// Number of times `close` has been called.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    /// Every exposure setting applied, in order.
    pub fn exposure_log(&self) -> Arc<Mutex<Vec<ExposureSettings>>> {
        Arc::clone(&self.exposures)
    }

    fn render(&self, index: u64) -> Frame {
        let pts = self.frame_interval * index as u32;
        match self.pattern {
            Pattern::Solid(rgb) => Frame::filled(self.width, self.height, rgb),
            Pattern::Gradient => {
                let (w, h) = (self.width.max(1), self.height.max(1));
                Frame::from_fn(self.width, self.height, |x, y| {
                    [(x * 255 / w) as u8, (y * 255 / h) as u8, 128]
                })
            }
        }
        .with_pts(pts)
    }
}

impl DeviceSource for SyntheticCamera {
    fn configure(&mut self, request: &CaptureRequest) -> Option<ActualGeometry> {
        debug!(
            "synthetic camera asked for {}x{}@{} ({:?}), staying at {}x{}",
            request.width, request.height, request.fps, request.codec, self.width, self.height
        );
        Some(ActualGeometry {
            width: self.width,
            height: self.height,
        })
    }

    fn apply_exposure(&mut self, settings: &ExposureSettings) {
        self.exposures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(*settings);
    }

    fn read(&mut self) -> Result<Frame> {
        let index = self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }
        if self.failures.fails(index) {
            return Err(CameraError::ReadFailure(format!(
                "synthetic read {index} scripted to fail"
            )));
        }
        Ok(self.render(index))
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
