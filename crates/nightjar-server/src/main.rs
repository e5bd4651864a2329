//! `nightjar` – serve a live camera feed with night mode and detection, or
//! save a fixed number of adjusted frames with `--capture N`.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use nightjar_camera::{CaptureRequest, DeviceSelector, DeviceSource, Pattern, SyntheticCamera};
use nightjar_detect::DetectorSet;
use nightjar_pipeline::{capture_batch, spawn_capture, BatchRequest, CameraContext, ControlSurface};
use nightjar_server::{
    config::{Args, ServerConfig},
    router, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::load(&args)?;

    if args.probe {
        probe_devices(&config.capture.request);
        return Ok(());
    }
    if let Some(frames) = args.capture {
        return run_batch(&config, &args, frames).await;
    }

    let request = &config.capture.request;
    info!("================ nightjar {} ================", env!("CARGO_PKG_VERSION"));
    info!("device   : {}", config.device);
    info!(
        "capture  : {}x{}@{} {:?}, jpeg q{}",
        request.width, request.height, request.fps, request.codec, config.capture.jpeg_quality
    );

    let detectors = load_detectors(&config);
    let availability = detectors.availability();
    info!("models   : yolo={} rfdetr={}", availability.yolo, availability.rfdetr);

    let ctx = Arc::new(CameraContext::new(availability));
    let capture = spawn_capture(
        Arc::clone(&ctx),
        opener(&config.device, request),
        detectors,
        config.capture.clone(),
    )?;

    let app = router(AppState {
        surface: Arc::new(ControlSurface::new(Arc::clone(&ctx))),
        stream_idle: config.capture.stream_idle(),
        snapshot_dir: config.snapshot_dir.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("listening on http://{}", config.bind);

    let shutdown_ctx = Arc::clone(&ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("could not listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            // open video feeds end once the capture loop stops
            shutdown_ctx.request_stop();
        })
        .await
        .context("server error")?;

    let state = tokio::task::spawn_blocking(move || capture.stop()).await?;
    info!("capture loop ended: {state:?}");
    Ok(())
}

/// Save `frames` adjusted frames and exit. Ctrl-C ends the run early.
async fn run_batch(config: &ServerConfig, args: &Args, frames: u32) -> Result<()> {
    let request = BatchRequest {
        frames,
        output_dir: args.output.clone().unwrap_or_else(|| config.snapshot_dir.clone()),
        controls: args.batch_controls(),
    };
    info!("device   : {}", config.device);

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, finishing batch");
            signal_stop.store(true, Ordering::Release);
        }
    });

    let open = opener(&config.device, &config.capture.request);
    let capture = config.capture.clone();
    let saved = tokio::task::spawn_blocking(move || {
        capture_batch(open, &capture, &request, &stop)
    })
    .await??;
    if (saved.len() as u32) < frames {
        warn!("only {} of {frames} frames captured", saved.len());
    }
    Ok(())
}

/// Build the device opener. It runs on the capture thread.
fn opener(
    device: &str,
    request: &CaptureRequest,
) -> impl FnOnce() -> nightjar_camera::Result<Box<dyn DeviceSource>> + Send + 'static {
    let device = device.to_string();
    let (width, height, fps) = (request.width, request.height, request.fps.max(1));
    move || -> nightjar_camera::Result<Box<dyn DeviceSource>> {
        if device.eq_ignore_ascii_case("synthetic") {
            let cam = SyntheticCamera::new(width, height, Pattern::Gradient)
                .with_frame_interval(Duration::from_secs(1) / fps);
            return Ok(Box::new(cam));
        }
        let selector = device
            .parse::<DeviceSelector>()
            .unwrap_or_else(|never| match never {});
        open_hardware(&selector)
    }
}

/// Open, configure and read once from each of the first few camera indexes.
fn probe_devices(request: &CaptureRequest) {
    const PROBE_INDEXES: u32 = 4;
    for index in 0..PROBE_INDEXES {
        let selector = DeviceSelector::Index(index);
        let mut cam = match open_hardware(&selector) {
            Ok(cam) => cam,
            Err(e) => {
                warn!("{}: open failed: {e}", selector.device_path());
                continue;
            }
        };
        cam.configure(request);
        match cam.read() {
            Ok(frame) => info!(
                "{}: ok, {}x{} frame",
                selector.device_path(),
                frame.width(),
                frame.height()
            ),
            Err(e) => warn!("{}: opened but read failed: {e}", selector.device_path()),
        }
        cam.close();
    }
}

#[cfg(feature = "gstreamer")]
fn open_hardware(selector: &DeviceSelector) -> nightjar_camera::Result<Box<dyn DeviceSource>> {
    Ok(Box::new(nightjar_camera::GstCamera::open(selector)?))
}

#[cfg(not(feature = "gstreamer"))]
fn open_hardware(selector: &DeviceSelector) -> nightjar_camera::Result<Box<dyn DeviceSource>> {
    Err(nightjar_camera::CameraError::DeviceUnavailable(format!(
        "{selector}: built without the `gstreamer` feature (use --device synthetic)"
    )))
}

/// Load whichever models are configured. A model that fails to load is
/// reported as unavailable, not fatal.
#[cfg(feature = "tract")]
fn load_detectors(config: &ServerConfig) -> DetectorSet {
    use nightjar_detect::{DetectionModel, TractDetr, TractYolo};
    use nightjar_server::config::ModelConfig;

    fn labels(model: &ModelConfig) -> Option<Vec<String>> {
        let path = model.labels.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(text) => Some(text.lines().map(|l| l.trim().to_string()).collect()),
            Err(e) => {
                warn!("labels {} unreadable, using class ids: {e}", path.display());
                None
            }
        }
    }

    let mut set = DetectorSet::new();
    if let Some(model) = &config.yolo {
        match TractYolo::new(&model.path, model.input_width, model.input_height) {
            Ok(det) => {
                let det = match labels(model) {
                    Some(l) => det.with_labels(l),
                    None => det,
                };
                info!("loaded YOLO model {}", model.path.display());
                set = set.with(DetectionModel::Yolo, Box::new(det));
            }
            Err(e) => warn!("YOLO model {} unavailable: {e}", model.path.display()),
        }
    }
    if let Some(model) = &config.rfdetr {
        match TractDetr::new(&model.path, model.input_width, model.input_height) {
            Ok(det) => {
                let det = match labels(model) {
                    Some(l) => det.with_labels(l),
                    None => det,
                };
                info!("loaded RF-DETR model {}", model.path.display());
                set = set.with(DetectionModel::RfDetr, Box::new(det));
            }
            Err(e) => warn!("RF-DETR model {} unavailable: {e}", model.path.display()),
        }
    }
    set
}

#[cfg(not(feature = "tract"))]
fn load_detectors(config: &ServerConfig) -> DetectorSet {
    if config.yolo.is_some() || config.rfdetr.is_some() {
        warn!("built without the `tract` feature, detection models ignored");
    }
    DetectorSet::new()
}
