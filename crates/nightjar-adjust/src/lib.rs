//! nightjar‑adjust – brightness / contrast / night-mode on RGB frames.
//!
//! [`adjust`] is a pure function: it reads one [`Frame`] and returns a new
//! one, touching no shared state, so the capture thread calls it without any
//! locking.

use nightjar_camera::Frame;

/// Brightness used instead of the caller's value in night mode.
pub const NIGHT_BRIGHTNESS: i32 = -5;
/// Contrast used instead of the caller's value in night mode.
pub const NIGHT_CONTRAST: f32 = 1.3;

/// The brightness/contrast pair actually applied for a given mode.
pub fn effective_levels(brightness: i32, contrast: f32, night_mode: bool) -> (i32, f32) {
    if night_mode {
        (NIGHT_BRIGHTNESS, NIGHT_CONTRAST)
    } else {
        (brightness, contrast)
    }
}

/// Apply night mode (if set) and then `out = clamp(in * contrast + brightness * 2)`.
///
/// Brightness is doubled so the public `[-50, 50]` range moves pixels about
/// as far as the `[0.5, 2.0]` contrast range does.
pub fn adjust(frame: &Frame, brightness: i32, contrast: f32, night_mode: bool) -> Frame {
    let (brightness, contrast) = effective_levels(brightness, contrast, night_mode);
    let lut = linear_lut(brightness, contrast);

    if night_mode {
        // desaturate, then re-expand to three channels for the colour pipeline
        frame.map_rgb(|px| [lut[luma(px) as usize]; 3])
    } else {
        frame.map_rgb(|[r, g, b]| [lut[r as usize], lut[g as usize], lut[b as usize]])
    }
}

/// BT.601 luminance of one RGB pixel.
fn luma(px: [u8; 3]) -> u8 {
    let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// 256-entry table for the per-channel linear transform.
fn linear_lut(brightness: i32, contrast: f32) -> [u8; 256] {
    let beta = (brightness * 2) as f32;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = (i as f32 * contrast + beta).round().clamp(0.0, 255.0) as u8;
    }
    lut
}
