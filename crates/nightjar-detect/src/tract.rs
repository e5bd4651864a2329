// nightjar-detect/src/tract.rs
// ------------------------------------------------------------
// ONNX backends run by Tract (pure Rust, no C deps, works on Pi)
//   * TractYolo – YOLOv8/11 head, output [1, 4 + C, N]
//   * TractDetr – DETR head, outputs logits [1, Q, C + 1]
//                 and boxes [1, Q, 4] (normalised cx, cy, w, h)
// ------------------------------------------------------------

use std::path::Path;

use log::info;
use nightjar_camera::Frame;
use tract_onnx::prelude::tract_ndarray::{ArrayView3, Ix3};
use tract_onnx::prelude::*;

use crate::{
    non_max_suppression, prepare_input, DetectError, Detection, DetectionLabel, Detector,
    Normalization, Result,
};

const NMS_IOU: f32 = 0.45;

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Load and optimize the ONNX model for a fixed `[1, 3, h, w]` input.
fn load(path: &Path, input_w: u32, input_h: u32) -> Result<Plan> {
    let model = tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec![1, 3, input_h as usize, input_w as usize],
            ),
        )?
        .into_optimized()?
        .into_runnable()?;
    info!("loaded {} ({}x{} input)", path.display(), input_w, input_h);
    Ok(model)
}

fn run(model: &Plan, frame: &Frame, w: u32, h: u32, norm: &Normalization) -> Result<TVec<TValue>> {
    let input = prepare_input(frame, w, h, norm)?;
    let tensor: Tensor = tract_ndarray::Array4::from_shape_vec((1, 3, h as usize, w as usize), input)
        .map_err(|e| DetectError::Inference(e.to_string()))?
        .into_tensor();
    Ok(model.run(tvec![tensor.into()])?)
}

fn as_ix3(view: tract_ndarray::ArrayViewD<'_, f32>) -> Result<ArrayView3<'_, f32>> {
    let shape = view.shape().to_vec();
    view.into_dimensionality::<Ix3>()
        .map_err(|_| DetectError::InvalidOutputShape(shape))
}

fn label(labels: &[String], class: usize) -> DetectionLabel {
    match labels.get(class) {
        Some(name) => DetectionLabel::Named(name.clone()),
        None => DetectionLabel::Class(class as u32),
    }
}

fn clamp_box(b: [f32; 4], frame: &Frame) -> [f32; 4] {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    [b[0].clamp(0.0, fw), b[1].clamp(0.0, fh), b[2].clamp(0.0, fw), b[3].clamp(0.0, fh)]
}

/// Tract-powered YOLOv8/11 detector.
pub struct TractYolo {
    model: Plan,
    input_w: u32,
    input_h: u32,
    labels: Vec<String>,
}

impl TractYolo {
    pub fn new(model_path: impl AsRef<Path>, input_w: u32, input_h: u32) -> Result<Self> {
        Ok(Self {
            model: load(model_path.as_ref(), input_w, input_h)?,
            input_w,
            input_h,
            labels: Vec::new(),
        })
    }

    /// Class names, indexed by class id.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

impl Detector for TractYolo {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let outputs = run(&self.model, frame, self.input_w, self.input_h, &Normalization::UNIT)?;
        let view = as_ix3(outputs[0].to_array_view::<f32>()?)?;

        let (rows, anchors) = (view.shape()[1], view.shape()[2]);
        if rows <= 4 {
            return Err(DetectError::InvalidOutputShape(view.shape().to_vec()));
        }

        // model space → frame pixels
        let sx = frame.width() as f32 / self.input_w as f32;
        let sy = frame.height() as f32 / self.input_h as f32;

        let mut dets = Vec::new();
        for a in 0..anchors {
            let (class, score) = (4..rows)
                .map(|r| (r - 4, view[[0, r, a]]))
                .fold((0, f32::MIN), |best, c| if c.1 > best.1 { c } else { best });
            if score < confidence {
                continue;
            }
            let (cx, cy) = (view[[0, 0, a]], view[[0, 1, a]]);
            let (w, h) = (view[[0, 2, a]], view[[0, 3, a]]);
            dets.push(Detection {
                label: label(&self.labels, class),
                score,
                bbox: clamp_box(
                    [
                        (cx - w / 2.0) * sx,
                        (cy - h / 2.0) * sy,
                        (cx + w / 2.0) * sx,
                        (cy + h / 2.0) * sy,
                    ],
                    frame,
                ),
            });
        }

        Ok(non_max_suppression(dets, NMS_IOU))
    }
}

/// Tract-powered DETR-family detector (set prediction, no NMS needed).
pub struct TractDetr {
    model: Plan,
    input_w: u32,
    input_h: u32,
    labels: Vec<String>,
}

impl TractDetr {
    pub fn new(model_path: impl AsRef<Path>, input_w: u32, input_h: u32) -> Result<Self> {
        Ok(Self {
            model: load(model_path.as_ref(), input_w, input_h)?,
            input_w,
            input_h,
            labels: Vec::new(),
        })
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

impl Detector for TractDetr {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let outputs = run(
            &self.model,
            frame,
            self.input_w,
            self.input_h,
            &Normalization::IMAGENET,
        )?;
        if outputs.len() < 2 {
            return Err(DetectError::InvalidOutputShape(vec![outputs.len()]));
        }
        let first = as_ix3(outputs[0].to_array_view::<f32>()?)?;
        let second = as_ix3(outputs[1].to_array_view::<f32>()?)?;
        // exporters disagree on output order; boxes are the one ending in 4
        let (logits, boxes) = if second.shape()[2] == 4 { (first, second) } else { (second, first) };
        if boxes.shape()[2] != 4 || logits.shape()[1] != boxes.shape()[1] || logits.shape()[2] < 2 {
            return Err(DetectError::InvalidOutputShape(logits.shape().to_vec()));
        }

        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let classes = logits.shape()[2] - 1; // last column is "no object"
        let mut dets = Vec::new();
        for q in 0..logits.shape()[1] {
            let max = (0..=classes).map(|c| logits[[0, q, c]]).fold(f32::MIN, f32::max);
            let denom: f32 = (0..=classes).map(|c| (logits[[0, q, c]] - max).exp()).sum();
            let (class, score) = (0..classes)
                .map(|c| (c, (logits[[0, q, c]] - max).exp() / denom))
                .fold((0, f32::MIN), |best, c| if c.1 > best.1 { c } else { best });
            if score < confidence {
                continue;
            }
            let (cx, cy) = (boxes[[0, q, 0]] * fw, boxes[[0, q, 1]] * fh);
            let (w, h) = (boxes[[0, q, 2]] * fw, boxes[[0, q, 3]] * fh);
            dets.push(Detection {
                label: label(&self.labels, class),
                score,
                bbox: clamp_box([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0], frame),
            });
        }
        Ok(dets)
    }
}
