//! Top-down keypoint geometry
//!
//! A detected person box is expanded to the model aspect ratio, cropped with
//! an affine warp and normalised. Heatmaps returned by the keypoint model are
//! decoded by arg-max with a quarter-pixel refinement toward the higher
//! neighbour, then mapped back through the inverse of the crop transform.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, ImagingError};

/// Box side in pixels that corresponds to a scale of 1.0
const PIXEL_STD: f32 = 200.0;
/// Context margin around the person box
const BOX_PADDING: f32 = 1.25;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// COCO keypoint names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointName {
    pub const ALL: [KeypointName; 17] = [
        KeypointName::Nose,
        KeypointName::LeftEye,
        KeypointName::RightEye,
        KeypointName::LeftEar,
        KeypointName::RightEar,
        KeypointName::LeftShoulder,
        KeypointName::RightShoulder,
        KeypointName::LeftElbow,
        KeypointName::RightElbow,
        KeypointName::LeftWrist,
        KeypointName::RightWrist,
        KeypointName::LeftHip,
        KeypointName::RightHip,
        KeypointName::LeftKnee,
        KeypointName::RightKnee,
        KeypointName::LeftAnkle,
        KeypointName::RightAnkle,
    ];

    /// Keypoint name from its heatmap channel index (0-16)
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// One keypoint in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: KeypointName,
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Crop geometry of one person: box centre and scale in units of [`PIXEL_STD`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonCrop {
    pub center: [f32; 2],
    pub scale: [f32; 2],
}

impl PersonCrop {
    /// Expand a person box to the model aspect ratio and pad it
    #[must_use]
    pub fn from_box(bbox: &BoundingBox, model_width: u32, model_height: u32) -> Self {
        let (cx, cy) = bbox.center();
        let aspect = model_width as f32 / model_height as f32;
        let mut w = bbox.width();
        let mut h = bbox.height();
        if w > aspect * h {
            h = w / aspect;
        } else if w < aspect * h {
            w = h * aspect;
        }
        Self {
            center: [cx, cy],
            scale: [w / PIXEL_STD * BOX_PADDING, h / PIXEL_STD * BOX_PADDING],
        }
    }

    /// Pixels of output per pixel of source for an output `width` wide
    fn zoom(&self, width: u32) -> f32 {
        width as f32 / (self.scale[0] * PIXEL_STD)
    }

    /// Affine source-to-output transform as a row-major 3x3 matrix
    #[must_use]
    pub fn transform(&self, width: u32, height: u32) -> [f32; 9] {
        let k = self.zoom(width);
        [
            k,
            0.0,
            width as f32 / 2.0 - k * self.center[0],
            0.0,
            k,
            height as f32 / 2.0 - k * self.center[1],
            0.0,
            0.0,
            1.0,
        ]
    }

    /// Map a point from an output of size `(width, height)` back to the source image
    #[must_use]
    pub fn to_source(&self, x: f32, y: f32, width: u32, height: u32) -> (f32, f32) {
        let k = self.zoom(width);
        (
            (x - width as f32 / 2.0) / k + self.center[0],
            (y - height as f32 / 2.0) / k + self.center[1],
        )
    }

    /// Warp the person region into a `width` x `height` crop
    pub fn crop(&self, image: &RgbImage, width: u32, height: u32) -> Result<RgbImage, ImagingError> {
        let projection = Projection::from_matrix(self.transform(width, height)).ok_or_else(|| {
            ImagingError::InvalidCrop(format!("degenerate crop scale {:?}", self.scale))
        })?;
        let mut out = RgbImage::new(width, height);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        );
        Ok(out)
    }
}

/// Normalise a crop into an `(1, 3, h, w)` tensor with ImageNet statistics
#[must_use]
pub fn crop_to_tensor(crop: &RgbImage) -> Array4<f32> {
    let (w, h) = crop.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (f32::from(pixel[c]) / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}

/// Decode `(joints, h, w)` heatmaps into keypoints in source-image pixels
pub fn keypoints_from_heatmaps(
    heatmaps: &Array3<f32>,
    crop: &PersonCrop,
) -> Result<Vec<Keypoint>, ImagingError> {
    let (joints, hm_h, hm_w) = heatmaps.dim();
    if joints != KeypointName::ALL.len() {
        return Err(ImagingError::HeatmapShape {
            expected: KeypointName::ALL.len(),
            found: heatmaps.shape().to_vec(),
        });
    }

    let mut keypoints = Vec::with_capacity(joints);
    for (joint, name) in KeypointName::ALL.iter().enumerate() {
        let channel = heatmaps.index_axis(ndarray::Axis(0), joint);
        let ((py, px), &maxval) = channel
            .indexed_iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| ImagingError::HeatmapShape {
                expected: joints,
                found: heatmaps.shape().to_vec(),
            })?;

        let (mut x, mut y) = (px as f32, py as f32);
        if maxval <= 0.0 {
            x = 0.0;
            y = 0.0;
        } else if px > 1 && px < hm_w - 1 && py > 1 && py < hm_h - 1 {
            let dx = channel[[py, px + 1]] - channel[[py, px - 1]];
            let dy = channel[[py + 1, px]] - channel[[py - 1, px]];
            x += 0.25 * sign(dx);
            y += 0.25 * sign(dy);
        }

        let (sx, sy) = crop.to_source(x, y, hm_w as u32, hm_h as u32);
        keypoints.push(Keypoint {
            name: *name,
            x: sx,
            y: sy,
            confidence: maxval,
        });
    }
    Ok(keypoints)
}

// `f32::signum` maps 0.0 to 1.0; a flat gradient must not shift the peak
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}
