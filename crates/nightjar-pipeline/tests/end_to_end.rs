// Camera → adjust → encode → publish → snapshot, through the public API only.
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use nightjar_camera::{FailurePlan, Frame, Pattern, SyntheticCamera, Warmup};
use nightjar_detect::{Availability, DetectorSet};
use nightjar_pipeline::{
    spawn_capture, CameraContext, CaptureConfig, ControlError, ControlSurface, LoopState,
};

fn config() -> CaptureConfig {
    CaptureConfig {
        warmup: Warmup::none(),
        retry_backoff_ms: 5,
        ..CaptureConfig::default()
    }
}

#[test]
fn dead_camera_gives_no_snapshot() -> Result<()> {
    let cam = SyntheticCamera::new(64, 48, Pattern::Gradient).with_failures(FailurePlan::Always);
    let ctx = Arc::new(CameraContext::new(Availability::default()));
    let surface = ControlSurface::new(Arc::clone(&ctx));
    let handle = spawn_capture(Arc::clone(&ctx), move || Ok(cam), DetectorSet::new(), config())?;

    assert_eq!(handle.join(), LoopState::Failed);

    let dir = tempfile::tempdir()?;
    let target = dir.path().join("frames");
    assert!(matches!(
        surface.capture_snapshot(&target),
        Err(ControlError::NoFrameAvailable)
    ));
    assert!(!target.exists());
    assert_eq!(surface.state().capture_state, LoopState::Failed);
    assert_eq!(surface.state().fps, 0);
    Ok(())
}

#[test]
fn solid_camera_streams_adjusted_colour() -> Result<()> {
    let cam = SyntheticCamera::new(64, 48, Pattern::Solid([100, 150, 200]))
        .with_frame_interval(Duration::from_millis(10));
    let ctx = Arc::new(CameraContext::new(Availability::default()));
    let surface = ControlSurface::new(Arc::clone(&ctx));
    assert_eq!(surface.set_brightness(10), 10);

    let handle = spawn_capture(Arc::clone(&ctx), move || Ok(cam), DetectorSet::new(), config())?;

    let deadline = Instant::now() + Duration::from_secs(3);
    while surface.state().fps == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(surface.state().fps > 0, "fps never reported");
    assert_eq!(surface.state().capture_state, LoopState::Streaming);

    let dir = tempfile::tempdir()?;
    let path = surface.capture_snapshot(dir.path())?;
    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("frame_0000.jpg"));

    let decoded = image::open(&path)?.to_rgb8();
    let (w, h) = decoded.dimensions();
    assert_eq!((w, h), (64, 48));
    let mean = Frame::new(w, h, decoded.into_raw())?.mean_rgb();
    // brightness 10 adds 20 per channel
    for (got, want) in mean.iter().zip([120.0, 170.0, 220.0]) {
        assert!((got - want).abs() < 4.0, "mean {mean:?}");
    }

    assert_eq!(handle.stop(), LoopState::Stopped);
    assert_eq!(surface.state().fps, 0);
    Ok(())
}
