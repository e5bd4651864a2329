use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};
use nightjar_camera::Frame;

use crate::{EncodedFrame, Result};

/// Compress an RGB frame to JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<EncodedFrame> {
    let mut buf = Vec::with_capacity(frame.pixels().len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).write_image(
        frame.pixels(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(EncodedFrame::new(buf))
}
