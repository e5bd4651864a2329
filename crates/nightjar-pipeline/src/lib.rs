// nightjar-pipeline/src/lib.rs
// ============================================================
// Capture → adjust → detect → encode → publish, for Nightjar
// ------------------------------------------------------------
// One producer thread owns the device and overwrites a single
// publish slot; any number of consumers read that slot under
// the same lock. No frame queue, latest value only.
// ------------------------------------------------------------
// Public API:
//   * CameraContext      – shared controls + publish slot
//   * spawn_capture()    – start the producer thread
//   * frame_stream()     – per-subscriber multipart byte stream
//   * ControlSurface     – clamped setters, state, snapshots
//   * capture_batch()    – save N adjusted frames and exit
// ============================================================

//! Nightjar – capture/publish pipeline
//!
//! The [`CameraContext`] is created once at startup and handed, as an
//! `Arc`, to the capture thread and to every consumer. Control values flow
//! in through [`ControlSurface`]; the capture loop picks them up at the top
//! of its next iteration.

use std::path::PathBuf;

use thiserror::Error;

mod batch;
mod capture;
mod config;
mod control;
mod encode;
mod state;
mod stream;

pub use batch::{capture_batch, BatchRequest};
pub use capture::{run_capture, spawn_capture, CaptureHandle, FpsCounter};
pub use config::CaptureConfig;
pub use control::{ControlError, ControlSurface, StateReport, SNAPSHOT_PATTERN};
pub use encode::encode_jpeg;
pub use state::{
    CameraContext, ControlState, EncodedFrame, LoopState, PublishSlot, BRIGHTNESS_RANGE,
    CONFIDENCE_RANGE, CONTRAST_RANGE,
};
pub use stream::{encode_part, frame_stream, MULTIPART_CONTENT_TYPE};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Could not open camera: {0}")]
    Open(#[source] nightjar_camera::CameraError),
    #[error("Writing frames failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
