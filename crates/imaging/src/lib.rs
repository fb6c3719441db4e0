//! RGB-side image operations for scan analysis
//!
//! # Features
//! - Scan-type dependent orientation and the inverse point mapping
//! - Gaussian blurring of detected face regions
//! - RGB/depth alignment check (Canny edges compared with SSIM)
//! - Tensor preparation for the standing/lying classifier
//! - Top-down keypoint geometry: person box to crop, heatmaps back to image points

pub mod alignment;
pub mod blur;
pub mod orientation;
pub mod pose;
pub mod tensor;

use image::{DynamicImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

pub use alignment::{check_rgb_depth_alignment, AlignmentReport, AlignmentStatus};
pub use blur::blur_regions;
pub use orientation::Rotation;
pub use pose::{Keypoint, KeypointName, PersonCrop};

/// Errors raised by image operations
#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Image decode/encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid crop: {0}")]
    InvalidCrop(String),

    #[error("Heatmap shape {found:?} does not match {expected} keypoints")]
    HeatmapShape { expected: usize, found: Vec<usize> },
}

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[must_use]
    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[must_use]
    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[must_use]
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Integer pixel rectangle `(x, y, w, h)` clipped to an image, or `None` if empty
    #[must_use]
    pub fn clip_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.floor().clamp(0.0, width as f32) as u32;
        let y1 = self.y1.floor().clamp(0.0, height as f32) as u32;
        let x2 = self.x2.ceil().clamp(0.0, width as f32) as u32;
        let y2 = self.y2.ceil().clamp(0.0, height as f32) as u32;
        (x2 > x1 && y2 > y1).then_some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Decode a JPEG/PNG payload into RGB
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ImagingError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Encode an image in the given container format
pub fn encode_image(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ImagingError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_geometry() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(bbox.width(), 20.0);
        assert_eq!(bbox.height(), 40.0);
        assert_eq!(bbox.center(), (20.0, 40.0));
    }

    #[test]
    fn test_clip_to_image() {
        let bbox = BoundingBox::new(-5.0, 2.5, 12.2, 50.0);
        assert_eq!(bbox.clip_to(10, 20), Some((0, 2, 10, 18)));
        assert_eq!(BoundingBox::new(11.0, 0.0, 15.0, 5.0).clip_to(10, 20), None);
    }

    #[test]
    fn test_jpeg_roundtrip_dimensions() {
        let img = RgbImage::from_pixel(16, 8, image::Rgb([120, 30, 200]));
        let bytes = encode_image(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg).unwrap();
        let decoded = decode_rgb(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }
}
