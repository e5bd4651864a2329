//! The one shared cell: live controls, the publish slot and the loop state,
//! all behind a single mutex.

use std::{
    ops::RangeInclusive,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use nightjar_detect::{Availability, Detection, DetectionModel};
use serde::{Deserialize, Serialize};

pub const BRIGHTNESS_RANGE: RangeInclusive<i32> = -50..=50;
pub const CONTRAST_RANGE: RangeInclusive<f64> = 0.5..=2.0;
pub const CONFIDENCE_RANGE: RangeInclusive<f64> = 0.0..=1.0;

const DEFAULT_CONTRAST: f64 = 1.0;
const DEFAULT_CONFIDENCE: f64 = 0.5;

fn clamp_real(value: f64, range: &RangeInclusive<f64>, fallback: f64) -> f64 {
    if !value.is_finite() {
        return fallback;
    }
    value.clamp(*range.start(), *range.end())
}

/// Runtime controls. Every setter clamps, so a stored value is always in
/// range and the capture loop never re-checks it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    brightness: i32,
    contrast: f64,
    night_mode: bool,
    detection_model: DetectionModel,
    detection_confidence: f64,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            brightness: 0,
            contrast: DEFAULT_CONTRAST,
            night_mode: false,
            detection_model: DetectionModel::None,
            detection_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl ControlState {
    pub fn brightness(&self) -> i32 {
        self.brightness
    }

    pub fn contrast(&self) -> f64 {
        self.contrast
    }

    pub fn night_mode(&self) -> bool {
        self.night_mode
    }

    pub fn detection_model(&self) -> DetectionModel {
        self.detection_model
    }

    pub fn detection_confidence(&self) -> f64 {
        self.detection_confidence
    }

    pub fn set_brightness(&mut self, value: i64) -> i32 {
        let (lo, hi) = (*BRIGHTNESS_RANGE.start() as i64, *BRIGHTNESS_RANGE.end() as i64);
        self.brightness = value.clamp(lo, hi) as i32;
        self.brightness
    }

    /// NaN falls back to the default contrast.
    pub fn set_contrast(&mut self, value: f64) -> f64 {
        self.contrast = clamp_real(value, &CONTRAST_RANGE, DEFAULT_CONTRAST);
        self.contrast
    }

    pub fn set_night_mode(&mut self, enabled: bool) -> bool {
        self.night_mode = enabled;
        self.night_mode
    }

    /// No availability check here; that happens at the control surface.
    pub fn set_detection_model(&mut self, model: DetectionModel) -> DetectionModel {
        self.detection_model = model;
        self.detection_model
    }

    /// NaN falls back to the default confidence.
    pub fn set_detection_confidence(&mut self, value: f64) -> f64 {
        self.detection_confidence = clamp_real(value, &CONFIDENCE_RANGE, DEFAULT_CONFIDENCE);
        self.detection_confidence
    }
}

/// A ready-to-send JPEG. Cloning shares the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: Arc<[u8]>,
}

impl EncodedFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Latest published result. Frame, detections and sequence always come
/// from the same capture iteration.
#[derive(Debug, Clone)]
pub struct PublishSlot {
    frame: Option<EncodedFrame>,
    fps: u32,
    detections: Arc<[Detection]>,
    sequence: u64,
}

impl Default for PublishSlot {
    fn default() -> Self {
        Self {
            frame: None,
            fps: 0,
            detections: Arc::from(Vec::new()),
            sequence: 0,
        }
    }
}

impl PublishSlot {
    pub fn frame(&self) -> Option<&EncodedFrame> {
        self.frame.as_ref()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// Number of publishes so far; 0 means nothing has been published.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Capture loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Starting,
    Warming,
    Streaming,
    Stopping,
    Stopped,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Failed)
    }
}

struct Shared {
    controls: ControlState,
    slot: PublishSlot,
    loop_state: LoopState,
}

/// Process-wide context shared by the capture thread and all consumers.
///
/// Every access takes the same lock and holds it only to copy values in or
/// out; frames are reference counted, so a copy out is cheap.
pub struct CameraContext {
    shared: Mutex<Shared>,
    stop: AtomicBool,
    availability: Availability,
}

impl CameraContext {
    pub fn new(availability: Availability) -> Self {
        Self {
            shared: Mutex::new(Shared {
                controls: ControlState::default(),
                slot: PublishSlot::default(),
                loop_state: LoopState::Starting,
            }),
            stop: AtomicBool::new(false),
            availability,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // plain values inside; a panicked holder cannot leave them half-written
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    /// One consistent copy of the controls.
    pub fn controls(&self) -> ControlState {
        self.lock().controls
    }

    pub fn update_controls<R>(&self, f: impl FnOnce(&mut ControlState) -> R) -> R {
        f(&mut self.lock().controls)
    }

    /// Overwrite frame and detections (and fps, when a window just closed)
    /// in one lock acquisition. Returns the new sequence number.
    pub fn publish(&self, frame: EncodedFrame, detections: Vec<Detection>, fps: Option<u32>) -> u64 {
        let detections: Arc<[Detection]> = detections.into();
        let mut shared = self.lock();
        let slot = &mut shared.slot;
        slot.frame = Some(frame);
        slot.detections = detections;
        slot.sequence += 1;
        if let Some(fps) = fps {
            slot.fps = fps;
        }
        slot.sequence
    }

    pub fn set_fps(&self, fps: u32) {
        self.lock().slot.fps = fps;
    }

    pub fn slot(&self) -> PublishSlot {
        self.lock().slot.clone()
    }

    /// Latest frame and its sequence number, if anything was published.
    pub fn latest_frame(&self) -> Option<(EncodedFrame, u64)> {
        let shared = self.lock();
        shared.slot.frame.clone().map(|f| (f, shared.slot.sequence))
    }

    /// Controls, slot and loop state from a single lock acquisition.
    pub fn snapshot(&self) -> (ControlState, PublishSlot, LoopState) {
        let shared = self.lock();
        (shared.controls, shared.slot.clone(), shared.loop_state)
    }

    pub fn loop_state(&self) -> LoopState {
        self.lock().loop_state
    }

    pub(crate) fn set_loop_state(&self, state: LoopState) {
        self.lock().loop_state = state;
    }

    /// Ask the capture loop to stop at the top of its next iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }
}
