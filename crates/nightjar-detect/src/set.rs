use std::panic::{self, AssertUnwindSafe};

use log::warn;
use nightjar_camera::Frame;
use serde::Serialize;

use crate::{annotate, Detection, DetectionModel, Detector};

/// Which models were loaded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Availability {
    pub yolo: bool,
    pub rfdetr: bool,
}

impl Availability {
    pub fn is_available(&self, model: DetectionModel) -> bool {
        match model {
            DetectionModel::None => true,
            DetectionModel::Yolo => self.yolo,
            DetectionModel::RfDetr => self.rfdetr,
        }
    }
}

/// The loaded detectors, at most one per model.
#[derive(Default)]
pub struct DetectorSet {
    yolo: Option<Box<dyn Detector>>,
    rfdetr: Option<Box<dyn Detector>>,
}

impl DetectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `detector` for `model`. Registering for `None` is ignored.
    pub fn with(mut self, model: DetectionModel, detector: Box<dyn Detector>) -> Self {
        match model {
            DetectionModel::None => warn!("ignoring detector registered for model `none`"),
            DetectionModel::Yolo => self.yolo = Some(detector),
            DetectionModel::RfDetr => self.rfdetr = Some(detector),
        }
        self
    }

    pub fn availability(&self) -> Availability {
        Availability {
            yolo: self.yolo.is_some(),
            rfdetr: self.rfdetr.is_some(),
        }
    }

    /// Run `model` on `frame` and draw its boxes.
    ///
    /// Never fails: an unloaded model, `none`, a backend error or a panic
    /// inside the backend all give back the frame with zero detections.
    pub fn transform(
        &mut self,
        frame: Frame,
        model: DetectionModel,
        confidence: f32,
    ) -> (Frame, Vec<Detection>) {
        let detector = match model {
            DetectionModel::None => None,
            DetectionModel::Yolo => self.yolo.as_mut(),
            DetectionModel::RfDetr => self.rfdetr.as_mut(),
        };
        let Some(detector) = detector else {
            return (frame, Vec::new());
        };

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame, confidence)));
        let detections = match outcome {
            Ok(Ok(d)) => d,
            Ok(Err(e)) => {
                warn!("{model} detection failed, no detections this frame: {e}");
                return (frame, Vec::new());
            }
            Err(_) => {
                warn!("{model} detector panicked, no detections this frame");
                return (frame, Vec::new());
            }
        };

        if detections.is_empty() {
            return (frame, detections);
        }
        match annotate(&frame, &detections) {
            Ok(annotated) => (annotated, detections),
            Err(e) => {
                warn!("{model} annotation failed: {e}");
                (frame, detections)
            }
        }
    }
}
