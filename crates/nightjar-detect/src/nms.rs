use std::cmp::Ordering;

use crate::Detection;

const MAX_KEEP: usize = 300;

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter + 1e-6)
}

/// Greedy NMS, highest score first. Boxes of different labels never
/// suppress each other.
pub fn non_max_suppression(dets: Vec<Detection>, iou_thr: f32) -> Vec<Detection> {
    let mut dets = dets;
    dets.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<Detection> = Vec::with_capacity(dets.len().min(MAX_KEEP));

    'outer: for d in dets {
        for k in &keep {
            if k.label == d.label && iou(&d.bbox, &k.bbox) > iou_thr {
                continue 'outer;
            }
        }
        keep.push(d);
        if keep.len() >= MAX_KEEP {
            break;
        }
    }
    keep
}
