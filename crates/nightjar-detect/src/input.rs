//! Frame → planar f32 model input.

use nightjar_camera::Frame;
use resize::{Pixel, Type};
use rgb::FromSlice;

use crate::Result;

/// Per-channel `(x / 255 - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Plain 0‑1 scaling (YOLO exports).
    pub const UNIT: Normalization = Normalization {
        mean: [0.0; 3],
        std: [1.0; 3],
    };

    /// ImageNet statistics (DETR-family backbones).
    pub const IMAGENET: Normalization = Normalization {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };
}

/// Resize an RGB frame to `dst_w × dst_h` (Lanczos3) and lay it out as
/// normalised CHW `f32`, ready for a `[1, 3, H, W]` tensor.
pub fn prepare_input(frame: &Frame, dst_w: u32, dst_h: u32, norm: &Normalization) -> Result<Vec<f32>> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let (dw, dh) = (dst_w as usize, dst_h as usize);

    let mut dst = vec![0u8; dw * dh * 3];
    let mut resizer = resize::new(w, h, dw, dh, Pixel::RGB8, Type::Lanczos3)?;
    resizer.resize(frame.pixels().as_rgb(), dst.as_rgb_mut())?;

    // HWC u8 → CHW f32
    let plane = dw * dh;
    let mut out = vec![0f32; plane * 3];
    for (i, px) in dst.chunks_exact(3).enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (px[c] as f32 / 255.0 - norm.mean[c]) / norm.std[c];
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_frame_resizes_to_constant_planes() {
        let frame = Frame::filled(64, 48, [255, 0, 51]);
        let out = prepare_input(&frame, 32, 32, &Normalization::UNIT).unwrap();
        assert_eq!(out.len(), 3 * 32 * 32);
        let plane = 32 * 32;
        assert!(out[..plane].iter().all(|v| (v - 1.0).abs() < 0.01));
        assert!(out[plane..2 * plane].iter().all(|v| v.abs() < 0.01));
        assert!(out[2 * plane..].iter().all(|v| (v - 0.2).abs() < 0.01));
    }
}
