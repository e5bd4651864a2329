use std::time::Duration;

use crate::{CameraError, Result};

/// A captured RGB24 frame.
///
/// Pixels are tightly packed, row-major, three bytes per pixel in
/// **R, G, B** order. Every consumer (adjuster, detector, JPEG encoder)
/// relies on that ordering. A `Frame` is never mutated after it is built:
/// each pipeline stage produces a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    pts: Duration,
}

impl Frame {
    /// Wrap an RGB24 buffer, checking it matches the geometry.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(CameraError::FrameSize {
                width,
                height,
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            pts: Duration::ZERO,
        })
    }

    /// A frame where every pixel has the same colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_fn(width, height, |_, _| rgb)
    }

    /// Build a frame pixel by pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
            pts: Duration::ZERO,
        }
    }

    /// New frame of the same geometry and timestamp, pixel by pixel.
    pub fn map_rgb(&self, mut f: impl FnMut([u8; 3]) -> [u8; 3]) -> Frame {
        let mut pixels = Vec::with_capacity(self.pixels.len());
        for px in self.pixels.chunks_exact(3) {
            pixels.extend_from_slice(&f([px[0], px[1], px[2]]));
        }
        Frame {
            width: self.width,
            height: self.height,
            pixels,
            pts: self.pts,
        }
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = pts;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pts(&self) -> Duration {
        self.pts
    }

    /// Raw RGB24 bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Colour at `(x, y)`. Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let base = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[base], self.pixels[base + 1], self.pixels[base + 2]]
    }

    /// Per-channel mean, `[R, G, B]`.
    pub fn mean_rgb(&self) -> [f64; 3] {
        let mut sums = [0u64; 3];
        for px in self.pixels.chunks_exact(3) {
            sums[0] += px[0] as u64;
            sums[1] += px[1] as u64;
            sums[2] += px[2] as u64;
        }
        let n = (self.pixels.len() / 3).max(1) as f64;
        [sums[0] as f64 / n, sums[1] as f64 / n, sums[2] as f64 / n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_short_buffer() {
        let err = Frame::new(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, CameraError::FrameSize { expected: 48, got: 10, .. }));
    }

    #[test]
    fn from_fn_is_row_major_rgb() {
        let f = Frame::from_fn(3, 2, |x, y| [x as u8, y as u8, 7]);
        assert_eq!(f.pixel(2, 1), [2, 1, 7]);
        assert_eq!(&f.pixels()[..6], &[0, 0, 7, 1, 0, 7]);
    }

    #[test]
    fn mean_of_filled_frame() {
        let f = Frame::filled(8, 8, [10, 20, 30]);
        assert_eq!(f.mean_rgb(), [10.0, 20.0, 30.0]);
    }
}
