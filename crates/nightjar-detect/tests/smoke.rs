use nightjar_camera::Frame;
use nightjar_detect::{
    DetectError, Detection, DetectionLabel, DetectionModel, Detector, DetectorSet,
};

/// Always reports one box in the middle of the frame.
struct CentreBox;

impl Detector for CentreBox {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> nightjar_detect::Result<Vec<Detection>> {
        let score = 0.8;
        if score < confidence {
            return Ok(Vec::new());
        }
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![Detection {
            label: DetectionLabel::Named("person".into()),
            score,
            bbox: [w * 0.25, h * 0.25, w * 0.75, h * 0.75],
        }])
    }
}

struct Broken;

impl Detector for Broken {
    fn detect(&mut self, _frame: &Frame, _confidence: f32) -> nightjar_detect::Result<Vec<Detection>> {
        Err(DetectError::Inference("model exploded".into()))
    }
}

struct Panicking;

impl Detector for Panicking {
    fn detect(&mut self, _frame: &Frame, _confidence: f32) -> nightjar_detect::Result<Vec<Detection>> {
        panic!("index out of bounds in output decoding");
    }
}

#[test]
fn selected_detector_annotates_a_copy() {
    let mut set = DetectorSet::new().with(DetectionModel::Yolo, Box::new(CentreBox));
    let frame = Frame::filled(40, 40, [0, 0, 0]);

    let (annotated, dets) = set.transform(frame.clone(), DetectionModel::Yolo, 0.5);
    assert_eq!(dets.len(), 1);
    assert_eq!(annotated.pixel(10, 10), [0, 255, 0]);
    assert_eq!(frame.pixel(10, 10), [0, 0, 0]);

    // threshold above the score: nothing, frame untouched
    let (plain, dets) = set.transform(frame.clone(), DetectionModel::Yolo, 0.9);
    assert!(dets.is_empty());
    assert_eq!(plain, frame);
}

#[test]
fn failures_and_missing_models_yield_no_detections() {
    let mut set = DetectorSet::new().with(DetectionModel::RfDetr, Box::new(Broken));
    let frame = Frame::filled(16, 16, [9, 9, 9]);

    let (out, dets) = set.transform(frame.clone(), DetectionModel::RfDetr, 0.1);
    assert!(dets.is_empty());
    assert_eq!(out, frame);

    let (out, dets) = set.transform(frame.clone(), DetectionModel::Yolo, 0.1);
    assert!(dets.is_empty());
    assert_eq!(out, frame);

    let avail = set.availability();
    assert!(!avail.yolo);
    assert!(avail.rfdetr);
    assert!(avail.is_available(DetectionModel::None));
}

#[test]
fn panicking_detector_yields_no_detections() {
    let mut set = DetectorSet::new().with(DetectionModel::Yolo, Box::new(Panicking));
    let frame = Frame::filled(16, 16, [40, 50, 60]);

    // twice: the detector stays registered and keeps being contained
    for _ in 0..2 {
        let (out, dets) = set.transform(frame.clone(), DetectionModel::Yolo, 0.1);
        assert!(dets.is_empty());
        assert_eq!(out, frame);
    }
    assert!(set.availability().yolo);
}

#[test]
fn detection_serialises_as_tagged_label() -> anyhow::Result<()> {
    let det = Detection {
        label: DetectionLabel::Class(3),
        score: 0.5,
        bbox: [1.0, 2.0, 3.0, 4.0],
    };
    let json = serde_json::to_value(&det)?;
    assert_eq!(json["label"]["class"], 3);
    assert_eq!(serde_json::to_value(DetectionModel::RfDetr)?, "rfdetr");
    Ok(())
}
