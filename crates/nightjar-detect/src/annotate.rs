use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use nightjar_camera::Frame;

use crate::{DetectError, Detection, Result};

const BOX_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;

/// Draw every detection box onto a copy of `frame`.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Result<Frame> {
    let (w, h, pts) = (frame.width(), frame.height(), frame.pts());
    let mut img = RgbImage::from_raw(w, h, frame.pixels().to_vec())
        .ok_or_else(|| DetectError::Annotate(format!("buffer does not fit {w}x{h}")))?;

    for det in detections {
        let [x1, y1, x2, y2] = det.bbox;
        let (x1, y1) = (x1.round() as i32, y1.round() as i32);
        let (x2, y2) = (x2.round() as i32, y2.round() as i32);
        for inset in 0..BOX_THICKNESS {
            let bw = x2 - x1 - 2 * inset;
            let bh = y2 - y1 - 2 * inset;
            if bw <= 0 || bh <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(bw as u32, bh as u32);
            draw_hollow_rect_mut(&mut img, rect, BOX_COLOUR);
        }
    }

    Frame::new(w, h, img.into_raw())
        .map(|f| f.with_pts(pts))
        .map_err(|e| DetectError::Annotate(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DetectionLabel;

    #[test]
    fn draws_green_border_only() {
        let frame = Frame::filled(40, 40, [0, 0, 0]);
        let det = Detection {
            label: DetectionLabel::Class(0),
            score: 0.9,
            bbox: [10.0, 10.0, 30.0, 30.0],
        };
        let out = annotate(&frame, &[det]).unwrap();
        assert_eq!(out.pixel(10, 10), [0, 255, 0]);
        assert_eq!(out.pixel(11, 20), [0, 255, 0]);
        assert_eq!(out.pixel(20, 20), [0, 0, 0]);
        assert_eq!(out.pixel(5, 5), [0, 0, 0]);
    }

    #[test]
    fn input_frame_is_not_touched() {
        let frame = Frame::filled(8, 8, [1, 2, 3]);
        let det = Detection {
            label: DetectionLabel::Named("cup".into()),
            score: 0.5,
            bbox: [0.0, 0.0, 8.0, 8.0],
        };
        let out = annotate(&frame, &[det]).unwrap();
        assert_eq!(frame.pixel(0, 0), [1, 2, 3]);
        assert_eq!(out.pixel(0, 0), [0, 255, 0]);
    }
}
