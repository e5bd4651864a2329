// Fixed-count capture to disk against synthetic sources.
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use nightjar_camera::{
    CameraError, CaptureRequest, ExposureSettings, FailurePlan, Pattern, SyntheticCamera, Warmup,
};
use nightjar_pipeline::{capture_batch, BatchRequest, CaptureConfig, ControlState, PipelineError};

fn config() -> CaptureConfig {
    CaptureConfig {
        request: CaptureRequest {
            width: 32,
            height: 24,
            ..CaptureRequest::default()
        },
        warmup: Warmup::none(),
        retry_backoff_ms: 0,
        ..CaptureConfig::default()
    }
}

fn names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
        .collect()
}

#[test]
fn saves_numbered_frames_into_a_new_directory() -> Result<()> {
    let cam = SyntheticCamera::new(32, 24, Pattern::Solid([100, 100, 100]));
    let closes = cam.close_counter();
    let dir = tempfile::tempdir()?;
    let mut controls = ControlState::default();
    controls.set_brightness(10);
    let request = BatchRequest {
        frames: 3,
        output_dir: dir.path().join("nested").join("frames"),
        controls,
    };

    let saved = capture_batch(move || Ok(cam), &config(), &request, &AtomicBool::new(false))?;

    assert_eq!(
        names(&saved),
        ["frame_0000.jpg", "frame_0001.jpg", "frame_0002.jpg"]
    );
    for path in &saved {
        assert!(path.starts_with(&request.output_dir));
        let px = *image::open(path)?.to_rgb8().get_pixel(16, 12);
        // brightness 10 adds 20 per channel
        assert!((i32::from(px[0]) - 120).abs() <= 4, "{px:?}");
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn three_failed_reads_in_a_row_end_the_batch() -> Result<()> {
    let cam = SyntheticCamera::new(32, 24, Pattern::Gradient)
        .with_failures(FailurePlan::Window { start: 2, len: 100 });
    let reads = cam.read_counter();
    let closes = cam.close_counter();
    let dir = tempfile::tempdir()?;
    let request = BatchRequest {
        frames: 10,
        output_dir: dir.path().to_path_buf(),
        controls: ControlState::default(),
    };

    let saved = capture_batch(move || Ok(cam), &config(), &request, &AtomicBool::new(false))?;

    assert_eq!(names(&saved), ["frame_0000.jpg", "frame_0001.jpg"]);
    assert_eq!(reads.load(Ordering::SeqCst), 5);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn night_batch_is_grey_and_sets_night_exposure() -> Result<()> {
    let cam = SyntheticCamera::new(32, 24, Pattern::Solid([200, 30, 30]));
    let exposures = cam.exposure_log();
    let dir = tempfile::tempdir()?;
    let mut controls = ControlState::default();
    controls.set_night_mode(true);
    let request = BatchRequest {
        frames: 1,
        output_dir: dir.path().to_path_buf(),
        controls,
    };

    let saved = capture_batch(move || Ok(cam), &config(), &request, &AtomicBool::new(false))?;

    let px = *image::open(&saved[0])?.to_rgb8().get_pixel(16, 12);
    assert!((i32::from(px[0]) - i32::from(px[1])).abs() <= 3, "{px:?}");
    assert!((i32::from(px[1]) - i32::from(px[2])).abs() <= 3, "{px:?}");
    assert_eq!(*exposures.lock().unwrap(), vec![ExposureSettings::NIGHT]);
    Ok(())
}

#[test]
fn raised_stop_flag_saves_nothing() -> Result<()> {
    let cam = SyntheticCamera::new(8, 8, Pattern::Gradient);
    let closes = cam.close_counter();
    let dir = tempfile::tempdir()?;
    let request = BatchRequest {
        frames: 5,
        output_dir: dir.path().join("frames"),
        controls: ControlState::default(),
    };

    let saved = capture_batch(move || Ok(cam), &config(), &request, &AtomicBool::new(true))?;

    assert!(saved.is_empty());
    assert!(!request.output_dir.exists());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn open_failure_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let request = BatchRequest {
        frames: 1,
        output_dir: dir.path().to_path_buf(),
        controls: ControlState::default(),
    };
    let result = capture_batch(
        || -> nightjar_camera::Result<SyntheticCamera> {
            Err(CameraError::DeviceUnavailable("/dev/video7".into()))
        },
        &config(),
        &request,
        &AtomicBool::new(false),
    );
    assert!(matches!(result, Err(PipelineError::Open(_))));
}
