//! One-shot capture of a fixed number of adjusted frames to disk.
//!
//! Same device protocol as the streaming loop (configure, exposure, warm-up,
//! failure budget) but nothing is shared: frames go straight to
//! `frame_NNNN.jpg` files in the output directory.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use log::{error, info, warn};
use nightjar_adjust::{adjust, effective_levels};
use nightjar_camera::{sleep_unless_stopped, DeviceSource};

use crate::{encode_jpeg, CaptureConfig, ControlState, PipelineError, Result};

/// What to capture and where.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub frames: u32,
    pub output_dir: PathBuf,
    /// Brightness, contrast and night mode; detection fields are ignored
    pub controls: ControlState,
}

/// Open the device, warm it up and save up to `request.frames` frames.
///
/// Returns the files written, in order. Fewer than requested means the
/// failure budget ran out or `stop` was raised; both are logged, neither is
/// an error. The device is closed on every path that opened it.
pub fn capture_batch<S, F>(
    open: F,
    config: &CaptureConfig,
    request: &BatchRequest,
    stop: &AtomicBool,
) -> Result<Vec<PathBuf>>
where
    S: DeviceSource,
    F: FnOnce() -> nightjar_camera::Result<S>,
{
    let mut source = open().map_err(PipelineError::Open)?;
    let saved = save_frames(&mut source, config, request, stop);
    source.close();
    saved
}

fn save_frames<S: DeviceSource + ?Sized>(
    source: &mut S,
    config: &CaptureConfig,
    request: &BatchRequest,
    stop: &AtomicBool,
) -> Result<Vec<PathBuf>> {
    let controls = &request.controls;
    source.configure(&config.request);
    if controls.night_mode() {
        info!("night mode: enabled");
        source.apply_night_settings();
    } else {
        source.apply_normal_settings();
    }

    if !config.warmup.run(source, stop) {
        info!("stopped during warm-up, nothing captured");
        return Ok(Vec::new());
    }

    let dir = &request.output_dir;
    fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
        path: dir.clone(),
        source,
    })?;
    let (brightness, contrast) = effective_levels(
        controls.brightness(),
        controls.contrast() as f32,
        controls.night_mode(),
    );
    info!("capturing {} frames to {}", request.frames, dir.display());
    info!("brightness: {brightness}, contrast: {contrast}");

    let budget = config.read_failure_budget;
    let mut failures = 0u32;
    let mut saved = Vec::with_capacity(request.frames as usize);
    while (saved.len() as u32) < request.frames {
        if stop.load(Ordering::Acquire) {
            info!("stop requested");
            break;
        }
        let frame = match source.read() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                if failures > budget {
                    error!("{failures} consecutive read failures, giving up: {e}");
                    break;
                }
                warn!("failed to grab frame (attempt {failures}/{budget}): {e}");
                sleep_unless_stopped(config.retry_backoff(), stop);
                continue;
            }
        };

        let adjusted = adjust(
            &frame,
            controls.brightness(),
            controls.contrast() as f32,
            controls.night_mode(),
        );
        let path = write_frame(dir, saved.len(), &adjusted, config.jpeg_quality)?;
        info!(
            "[{}/{}] saved {} ({}x{})",
            saved.len() + 1,
            request.frames,
            path.display(),
            frame.width(),
            frame.height()
        );
        saved.push(path);
    }

    info!("captured {} of {} frames to {}", saved.len(), request.frames, dir.display());
    Ok(saved)
}

fn write_frame(
    dir: &Path,
    index: usize,
    frame: &nightjar_camera::Frame,
    quality: u8,
) -> Result<PathBuf> {
    let jpeg = encode_jpeg(frame, quality)?;
    let path = dir.join(format!("frame_{index:04}.jpg"));
    fs::write(&path, jpeg.as_bytes()).map_err(|source| PipelineError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
