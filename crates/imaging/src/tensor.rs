//! Classifier input tensors

use image::{imageops, RgbImage};
use ndarray::{s, Array3, Array4};

use crate::orientation::Rotation;

/// Standing/lying classifier input: height 240, width 180
pub const CLASSIFIER_HEIGHT: u32 = 240;
pub const CLASSIFIER_WIDTH: u32 = 180;

/// Rotate clockwise, resize to 240x180 and scale to `[0, 1]`, as `(h, w, 3)`
#[must_use]
pub fn classifier_input(image: &RgbImage) -> Array3<f32> {
    let rotated = Rotation::Clockwise90.apply(image);
    let resized = imageops::resize(
        &rotated,
        CLASSIFIER_WIDTH,
        CLASSIFIER_HEIGHT,
        imageops::FilterType::Triangle,
    );
    let mut tensor =
        Array3::<f32>::zeros((CLASSIFIER_HEIGHT as usize, CLASSIFIER_WIDTH as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
        }
    }
    tensor
}

/// Stack per-image `(h, w, c)` tensors into one `(n, h, w, c)` batch
#[must_use]
pub fn stack_batch(items: &[Array3<f32>]) -> Array4<f32> {
    let Some(first) = items.first() else {
        return Array4::zeros((0, 0, 0, 0));
    };
    let (h, w, c) = first.dim();
    let mut batch = Array4::<f32>::zeros((items.len(), h, w, c));
    for (i, item) in items.iter().enumerate() {
        batch.slice_mut(s![i, .., .., ..]).assign(item);
    }
    batch
}
