// nightjar-camera/src/lib.rs
// ============================================================
// Device source layer for Nightjar
// Owns the camera handle, applies best-effort capture settings
// and hands out RGB24 frames, one per device read.
// ------------------------------------------------------------
// Public API:
//   * DeviceSource        – trait every backend implements
//   * Warmup::run()       – discard-read protocol before streaming
//   * SyntheticCamera     – scripted in-memory source (tests, demos)
//   * GstCamera           – v4l2src → appsink (`--features gstreamer`)
// ------------------------------------------------------------
// Build notes
//   * The GStreamer backend needs the system gst 1.22 dev libs.
//   * Everything else is pure Rust.
// ============================================================

//! Nightjar – camera capture layer
//!
//! A [`DeviceSource`] is opened once, configured once (best-effort, the
//! driver may ignore the request) and then read frame by frame. Frames are
//! delivered as [`Frame`], an immutable RGB24 bitmap. Nothing in here
//! queues frames: one `read()` is one device read.

use thiserror::Error;

mod frame;
mod source;
mod synthetic;
mod warmup;

#[cfg(feature = "gstreamer")]
mod gst_source;

pub use frame::Frame;
pub use source::{
    ActualGeometry, CaptureRequest, CodecHint, DeviceSelector, DeviceSource, ExposureSettings,
};
pub use synthetic::{FailurePlan, Pattern, SyntheticCamera};
pub use warmup::{sleep_unless_stopped, Warmup};

#[cfg(feature = "gstreamer")]
pub use gst_source::GstCamera;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Failed to read frame: {0}")]
    ReadFailure(String),
    #[error("Frame buffer has {got} bytes, expected {expected} for {width}x{height} RGB")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },
    #[cfg(feature = "gstreamer")]
    #[error("GStreamer init failed: {0}")]
    GstInit(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Failed to parse pipeline: {0}")]
    ParsePipeline(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Pipeline element `{0}` not found")]
    ElementNotFound(&'static str),
}

pub type Result<T> = std::result::Result<T, CameraError>;
