//! Scan-type dependent image orientation
//!
//! Standing scans are captured in portrait and rotated clockwise before
//! inference; lying scans are rotated counter-clockwise. Points found on the
//! rotated image are mapped back with [`Rotation::unrotate_point`].

use cgm_rg_common::PoseType;
use image::{imageops, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise90,
    CounterClockwise90,
}

impl Rotation {
    #[must_use]
    pub fn for_pose(pose: PoseType) -> Self {
        match pose {
            PoseType::Standing => Rotation::Clockwise90,
            PoseType::Lying => Rotation::CounterClockwise90,
        }
    }

    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Rotation::Clockwise90 => Rotation::CounterClockwise90,
            Rotation::CounterClockwise90 => Rotation::Clockwise90,
        }
    }

    #[must_use]
    pub fn apply(self, image: &RgbImage) -> RgbImage {
        match self {
            Rotation::Clockwise90 => imageops::rotate90(image),
            Rotation::CounterClockwise90 => imageops::rotate270(image),
        }
    }

    /// Map a point on the rotated image back to the original image.
    ///
    /// `original_width` and `original_height` are the dimensions before rotation.
    #[must_use]
    pub fn unrotate_point(
        self,
        x: f32,
        y: f32,
        original_width: u32,
        original_height: u32,
    ) -> (f32, f32) {
        match self {
            // (ox, oy) -> (H-1-oy, ox)
            Rotation::Clockwise90 => (y, original_height as f32 - 1.0 - x),
            // (ox, oy) -> (oy, W-1-ox)
            Rotation::CounterClockwise90 => (original_width as f32 - 1.0 - y, x),
        }
    }
}
