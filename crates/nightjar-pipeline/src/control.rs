use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use nightjar_detect::DetectionModel;
use serde::Serialize;
use thiserror::Error;

use crate::{CameraContext, EncodedFrame, LoopState};

/// Files counted when numbering a new snapshot.
pub const SNAPSHOT_PATTERN: &str = "frame_*.jpg";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Detection model `{0}` is not loaded")]
    ModelUnavailable(DetectionModel),
    #[error("Unknown detection model `{0}`")]
    UnknownModel(String),
    #[error("No frame available")]
    NoFrameAvailable,
    #[error("Snapshot I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid snapshot directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, ControlError>;

/// Everything a client can ask about the camera, from one lock acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateReport {
    pub brightness: i32,
    pub contrast: f64,
    pub night_mode: bool,
    pub fps: u32,
    pub detection_model: DetectionModel,
    pub detection_confidence: f64,
    pub detections_count: usize,
    pub yolo_available: bool,
    pub rfdetr_available: bool,
    pub capture_state: LoopState,
}

/// Request-side entry point: validated mutators and read-only queries over
/// the shared context.
#[derive(Clone)]
pub struct ControlSurface {
    ctx: Arc<CameraContext>,
}

impl ControlSurface {
    pub fn new(ctx: Arc<CameraContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<CameraContext> {
        &self.ctx
    }

    pub fn state(&self) -> StateReport {
        let (controls, slot, loop_state) = self.ctx.snapshot();
        let availability = self.ctx.availability();
        StateReport {
            brightness: controls.brightness(),
            contrast: controls.contrast(),
            night_mode: controls.night_mode(),
            fps: slot.fps(),
            detection_model: controls.detection_model(),
            detection_confidence: controls.detection_confidence(),
            detections_count: slot.detections().len(),
            yolo_available: availability.yolo,
            rfdetr_available: availability.rfdetr,
            capture_state: loop_state,
        }
    }

    pub fn set_brightness(&self, value: i64) -> i32 {
        self.ctx.update_controls(|c| c.set_brightness(value))
    }

    pub fn set_contrast(&self, value: f64) -> f64 {
        self.ctx.update_controls(|c| c.set_contrast(value))
    }

    pub fn set_night_mode(&self, enabled: bool) -> bool {
        let stored = self.ctx.update_controls(|c| c.set_night_mode(enabled));
        info!("night mode {}", if stored { "on" } else { "off" });
        stored
    }

    /// Select a model. Models that were not loaded at startup are rejected
    /// and the current selection is kept.
    pub fn set_detection_model(&self, model: DetectionModel) -> Result<DetectionModel> {
        if !self.ctx.availability().is_available(model) {
            return Err(ControlError::ModelUnavailable(model));
        }
        let stored = self.ctx.update_controls(|c| c.set_detection_model(model));
        info!("detection model set to {stored}");
        Ok(stored)
    }

    pub fn set_detection_model_by_name(&self, name: &str) -> Result<DetectionModel> {
        let model = name
            .parse::<DetectionModel>()
            .map_err(|_| ControlError::UnknownModel(name.to_string()))?;
        self.set_detection_model(model)
    }

    pub fn set_detection_confidence(&self, value: f64) -> f64 {
        self.ctx.update_controls(|c| c.set_detection_confidence(value))
    }

    /// The most recently published JPEG.
    pub fn latest_jpeg(&self) -> Result<EncodedFrame> {
        self.ctx
            .latest_frame()
            .map(|(frame, _)| frame)
            .ok_or(ControlError::NoFrameAvailable)
    }

    /// Write the latest frame to `dir` as `frame_NNNN.jpg`, numbered by how
    /// many snapshots the directory already holds.
    ///
    /// Numbering is not atomic: two concurrent calls can pick the same name.
    pub fn capture_snapshot(&self, dir: &Path) -> Result<PathBuf> {
        let frame = self.latest_jpeg()?;

        fs::create_dir_all(dir).map_err(|source| ControlError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let escaped = glob::Pattern::escape(&dir.to_string_lossy());
        let pattern = Path::new(&escaped).join(SNAPSHOT_PATTERN);
        let existing = glob::glob(&pattern.to_string_lossy())?
            .filter_map(|entry| entry.ok())
            .count();

        let path = dir.join(format!("frame_{existing:04}.jpg"));
        fs::write(&path, frame.as_bytes()).map_err(|source| ControlError::Io {
            path: path.clone(),
            source,
        })?;
        info!("saved snapshot {}", path.display());
        Ok(path)
    }
}
