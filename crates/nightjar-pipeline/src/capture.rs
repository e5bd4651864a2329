//! The producer: one thread that owns the device and publishes frames.
//!
//! `Starting → Warming → Streaming → Stopping → Stopped`, with `Failed`
//! reachable on open failure or when consecutive read failures run past the
//! budget. The device is closed exactly once on every path that opened it.
//! A panic anywhere in the loop also ends in `Failed` with the stop flag
//! raised, so streams and shutdown never wait on a dead thread.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use nightjar_adjust::adjust;
use nightjar_camera::{sleep_unless_stopped, DeviceSource};
use nightjar_detect::{DetectionModel, DetectorSet};

use crate::{encode_jpeg, CameraContext, CaptureConfig, LoopState, PipelineError, Result};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Counts frames in consecutive one-second windows.
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    count: u32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Count one frame. Returns the window's total once a second has
    /// elapsed, and starts a new window.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        self.count += 1;
        if now.duration_since(self.window_start) >= FPS_WINDOW {
            let fps = self.count;
            self.count = 0;
            self.window_start = now;
            Some(fps)
        } else {
            None
        }
    }
}

/// Handle to a running capture thread.
pub struct CaptureHandle {
    ctx: Arc<CameraContext>,
    thread: thread::JoinHandle<LoopState>,
}

impl CaptureHandle {
    /// Raise the stop flag without waiting.
    pub fn signal_stop(&self) {
        self.ctx.request_stop();
    }

    /// Wait for the loop to end on its own.
    pub fn join(self) -> LoopState {
        self.thread.join().unwrap_or_else(|_| {
            error!("capture thread panicked");
            finish(&self.ctx, LoopState::Failed)
        })
    }

    /// Signal the loop to stop and block until the thread exits.
    pub fn stop(self) -> LoopState {
        self.signal_stop();
        self.join()
    }
}

/// Spawn the capture thread.
///
/// `open` runs on the capture thread, so the device handle never crosses
/// threads once it exists.
pub fn spawn_capture<S, F>(
    ctx: Arc<CameraContext>,
    open: F,
    detectors: DetectorSet,
    config: CaptureConfig,
) -> Result<CaptureHandle>
where
    S: DeviceSource,
    F: FnOnce() -> nightjar_camera::Result<S> + Send + 'static,
{
    let thread_ctx = Arc::clone(&ctx);
    let thread = thread::Builder::new()
        .name("nightjar-capture".into())
        .spawn(move || run_capture(&thread_ctx, open, detectors, &config))
        .map_err(PipelineError::Spawn)?;
    Ok(CaptureHandle { ctx, thread })
}

/// Run the whole capture lifecycle on the calling thread. Returns the
/// terminal state.
pub fn run_capture<S, F>(
    ctx: &CameraContext,
    open: F,
    detectors: DetectorSet,
    config: &CaptureConfig,
) -> LoopState
where
    S: DeviceSource,
    F: FnOnce() -> nightjar_camera::Result<S>,
{
    panic::catch_unwind(AssertUnwindSafe(|| lifecycle(ctx, open, detectors, config)))
        .unwrap_or_else(|_| {
            error!("capture loop panicked");
            finish(ctx, LoopState::Failed)
        })
}

fn lifecycle<S, F>(
    ctx: &CameraContext,
    open: F,
    mut detectors: DetectorSet,
    config: &CaptureConfig,
) -> LoopState
where
    S: DeviceSource,
    F: FnOnce() -> nightjar_camera::Result<S>,
{
    ctx.set_loop_state(LoopState::Starting);
    let mut source = match open() {
        Ok(source) => source,
        Err(e) => {
            error!("could not open camera: {e}");
            return finish(ctx, LoopState::Failed);
        }
    };

    let request = &config.request;
    match source.configure(request) {
        Some(actual) if !actual.matches(request) => warn!(
            "requested {}x{}, device delivers {}x{}",
            request.width, request.height, actual.width, actual.height
        ),
        Some(actual) => info!("camera configured at {}x{}", actual.width, actual.height),
        None => info!(
            "requested {}x{}@{} ({:?}); actual geometry known after first frame",
            request.width, request.height, request.fps, request.codec
        ),
    }

    ctx.set_loop_state(LoopState::Warming);
    let outcome = if config.warmup.run(&mut source, ctx.stop_flag()) {
        ctx.set_loop_state(LoopState::Streaming);
        info!("camera ready, streaming");
        // contained here so the device still gets closed
        panic::catch_unwind(AssertUnwindSafe(|| {
            stream(ctx, &mut source, &mut detectors, config)
        }))
        .unwrap_or_else(|_| {
            error!("capture loop panicked while streaming");
            LoopState::Failed
        })
    } else {
        LoopState::Stopped
    };

    if outcome == LoopState::Stopped {
        ctx.set_loop_state(LoopState::Stopping);
    }
    source.close();
    info!("camera closed");
    finish(ctx, outcome)
}

fn finish(ctx: &CameraContext, state: LoopState) -> LoopState {
    ctx.request_stop();
    ctx.set_fps(0);
    ctx.set_loop_state(state);
    state
}

/// The steady-state loop. Returns `Stopped` or `Failed`.
fn stream<S: DeviceSource + ?Sized>(
    ctx: &CameraContext,
    source: &mut S,
    detectors: &mut DetectorSet,
    config: &CaptureConfig,
) -> LoopState {
    let budget = config.read_failure_budget;
    let mut failures = 0u32;
    let mut night_applied: Option<bool> = None;
    let mut fps = FpsCounter::new(Instant::now());
    let mut last_geometry = None;

    loop {
        if ctx.stop_requested() {
            info!("stop requested");
            return LoopState::Stopped;
        }

        let frame = match source.read() {
            Ok(frame) => {
                if failures > 0 {
                    info!("camera recovered after {failures} failed read(s)");
                }
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                if failures > budget {
                    error!("{failures} consecutive read failures, giving up: {e}");
                    return LoopState::Failed;
                }
                warn!("read failed (attempt {failures}/{budget}): {e}");
                sleep_unless_stopped(config.retry_backoff(), ctx.stop_flag());
                continue;
            }
        };

        let geometry = (frame.width(), frame.height());
        if last_geometry != Some(geometry) {
            debug!("frame geometry {}x{}", geometry.0, geometry.1);
            last_geometry = Some(geometry);
        }

        // one snapshot per iteration; changes land on the next frame
        let controls = ctx.controls();
        if night_applied != Some(controls.night_mode()) {
            if controls.night_mode() {
                source.apply_night_settings();
            } else {
                source.apply_normal_settings();
            }
            night_applied = Some(controls.night_mode());
        }

        let adjusted = adjust(
            &frame,
            controls.brightness(),
            controls.contrast() as f32,
            controls.night_mode(),
        );
        let (out, detections) = match controls.detection_model() {
            DetectionModel::None => (adjusted, Vec::new()),
            model => detectors.transform(adjusted, model, controls.detection_confidence() as f32),
        };

        let encoded = match encode_jpeg(&out, config.jpeg_quality) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("dropping frame: {e}");
                continue;
            }
        };

        let fps_update = fps.tick(Instant::now());
        ctx.publish(encoded, detections, fps_update);
        if let Some(n) = fps_update {
            debug!("{n} fps");
        }
    }
}
