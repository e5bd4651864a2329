// nightjar-detect/src/lib.rs
// ============================================================
// nightjar-detect  –  optional object-detection stage
// Frame → (annotated Frame, Vec<Detection>)
// ------------------------------------------------------------
// Public API
//   * Detector::detect(frame, conf) – one backend, may fail
//   * DetectorSet::transform(..)    – never fails the caller
//   * TractYolo / TractDetr         – ONNX backends (`--features tract`)
// ------------------------------------------------------------
//   Build notes
//     * Default build carries no inference engine; detectors are
//       plugged in by the binary.
// ============================================================

//! Nightjar – detection layer
//!
//! Every backend produces the same closed [`Detection`] type, so the
//! capture loop never sees model-specific result shapes. Backends
//! implement [`Detector`]; the capture loop only talks to [`DetectorSet`],
//! which turns any backend failure into "no detections this frame".

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod annotate;
mod input;
mod nms;
mod set;

#[cfg(feature = "tract")]
mod tract;

pub use annotate::annotate;
pub use input::{prepare_input, Normalization};
pub use nms::{iou, non_max_suppression};
pub use set::{Availability, DetectorSet};

#[cfg(feature = "tract")]
pub use tract::{TractDetr, TractYolo};

#[cfg(feature = "tract")]
use tract_onnx::prelude::TractError;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Unknown detection model `{0}`")]
    UnknownModel(String),
    #[error("Resize failed: {0}")]
    Resize(#[from] resize::Error),
    #[error("Invalid model output shape {0:?}")]
    InvalidOutputShape(Vec<usize>),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Annotation failed: {0}")]
    Annotate(String),
    #[cfg(feature = "tract")]
    #[error("Model load or inference error: {0}")]
    Tract(#[from] TractError),
}

pub type Result<T> = std::result::Result<T, DetectError>;

/// Which detector (if any) runs on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    #[default]
    None,
    Yolo,
    RfDetr,
}

impl DetectionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionModel::None => "none",
            DetectionModel::Yolo => "yolo",
            DetectionModel::RfDetr => "rfdetr",
        }
    }
}

impl FromStr for DetectionModel {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(DetectionModel::None),
            "yolo" => Ok(DetectionModel::Yolo),
            "rfdetr" => Ok(DetectionModel::RfDetr),
            other => Err(DetectError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for DetectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was detected: a class name when the backend knows it, else its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLabel {
    Named(String),
    Class(u32),
}

impl fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionLabel::Named(name) => f.write_str(name),
            DetectionLabel::Class(id) => write!(f, "class {id}"),
        }
    }
}

/// One detection: `[x1, y1, x2, y2]` in pixels of the frame it ran on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: DetectionLabel,
    pub score: f32,
    pub bbox: [f32; 4],
}

/// Trait for object detectors.
pub trait Detector: Send {
    /// Detections scoring at least `confidence` on `frame`.
    fn detect(&mut self, frame: &nightjar_camera::Frame, confidence: f32) -> Result<Vec<Detection>>;
}
