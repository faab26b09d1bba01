//! Frame capture: pixel readback from a video surface, JPEG encoding, and
//! wrapping into a [`Frame`]. Adding the frame to a gallery is left to the
//! caller.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};

use crate::models::frame::{Dimensions, EncodedImage, Frame};

/// JPEG quality for captured frames.
pub const CAPTURE_JPEG_QUALITY: u8 = 95;

pub const CAPTURE_MIME_TYPE: &str = "image/jpeg";

/// Anything that can hand back the pixels currently displayed for a video,
/// at its native resolution.
pub trait VideoSurface {
    fn read_pixels(&self) -> Result<RgbaImage, ReadbackError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    #[error("surface is tainted by cross-origin content")]
    CrossOrigin,

    #[error("no decoded frame is available at the current position")]
    NotReady,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Frame capture was blocked: the video source does not allow pixel access (cross-origin). Load the video from a different source.")]
    Blocked,

    #[error("No frame available to capture yet")]
    NotReady,

    #[error("Failed to encode captured frame: {0}")]
    Encode(#[from] image::ImageError),
}

impl From<ReadbackError> for CaptureError {
    fn from(err: ReadbackError) -> Self {
        match err {
            ReadbackError::CrossOrigin => CaptureError::Blocked,
            ReadbackError::NotReady => CaptureError::NotReady,
        }
    }
}

/// Capture the currently displayed frame of `surface` at `current_time`
/// seconds into the source.
pub fn capture(surface: &dyn VideoSurface, current_time: f64) -> Result<Frame, CaptureError> {
    let pixels = surface.read_pixels()?;
    let dimensions = Dimensions {
        width: pixels.width(),
        height: pixels.height(),
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgba8(pixels).into_rgb8();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, CAPTURE_JPEG_QUALITY).encode_image(&rgb)?;

    let frame = Frame::captured(
        EncodedImage::from_bytes(CAPTURE_MIME_TYPE, &encoded),
        current_time,
        dimensions,
    );

    tracing::debug!(
        frame_id = %frame.id,
        timestamp = current_time,
        width = dimensions.width,
        height = dimensions.height,
        encoded_bytes = encoded.len(),
        "Captured frame"
    );

    Ok(frame)
}

/// A decoded still standing in for a paused video element.
///
/// `origin_clean` mirrors the browser's tainted-canvas rule: pixels from a
/// cross-origin source without permissive headers cannot be read back.
pub struct RasterSurface {
    image: RgbaImage,
    origin_clean: bool,
}

impl RasterSurface {
    pub fn new(image: RgbaImage, origin_clean: bool) -> Self {
        Self {
            image,
            origin_clean,
        }
    }

    pub fn decode(bytes: &[u8], origin_clean: bool) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?.into_rgba8();
        Ok(Self::new(image, origin_clean))
    }
}

impl VideoSurface for RasterSurface {
    fn read_pixels(&self) -> Result<RgbaImage, ReadbackError> {
        if !self.origin_clean {
            return Err(ReadbackError::CrossOrigin);
        }
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(ReadbackError::NotReady);
        }
        Ok(self.image.clone())
    }
}
