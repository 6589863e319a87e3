use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

use crate::encoding::{ImageEncoding, ImageMime};
use crate::error::CaptureError;

/// Packed RGB24 frame at the track's native resolution.
#[derive(Clone)]
pub struct RgbFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Byte length of a packed RGB24 frame, or `None` if it does not fit in memory.
pub(crate) fn rgb24_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(3)
}

/// Draw the frame into an off-screen raster of its own size and compress it.
pub fn encode_jpeg(frame: &RgbFrame, quality: u8) -> Result<ImageEncoding, CaptureError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::NoActiveStream);
    }
    let raster = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone()).ok_or_else(
        || CaptureError::FrameEncode {
            reason: format!(
                "frame length {} does not match {}x{} RGB",
                frame.pixels.len(),
                frame.width,
                frame.height
            ),
        },
    )?;

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|err| CaptureError::FrameEncode {
            reason: err.to_string(),
        })?;
    Ok(ImageEncoding::new(bytes, ImageMime::Jpeg))
}
