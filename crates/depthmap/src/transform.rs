//! Depth-to-tensor transforms and visualization

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{Array2, Array3};

/// Triangle-filter resize of a 2-D array to `(rows, cols)`, axis 0 as image
/// height.
fn resize(depth: &Array2<f32>, rows: usize, cols: usize) -> Array2<f32> {
    let (src_rows, src_cols) = depth.dim();
    if (src_rows, src_cols) == (rows, cols) {
        return depth.clone();
    }
    if src_rows == 0 || src_cols == 0 || rows == 0 || cols == 0 {
        return Array2::zeros((rows, cols));
    }

    // imageops clamps float samples to [0, 1]
    let peak = depth.fold(1.0f32, |acc, v| acc.max(*v));
    let image: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(src_cols as u32, src_rows as u32, |x, y| {
            Luma([depth[[y as usize, x as usize]] / peak])
        });
    let resized = imageops::resize(&image, cols as u32, rows as u32, FilterType::Triangle);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        resized.get_pixel(c as u32, r as u32)[0] * peak
    })
}

/// Scale depth for a regression model.
///
/// Divides by `normalization_value` (7.5 for point-cloud-era models, 3.0 for
/// depth-image models), resizes to `(target_height, target_width)` and adds a
/// trailing channel axis.
#[must_use]
pub fn normalize_for_model(
    depth: &Array2<f32>,
    target_height: usize,
    target_width: usize,
    normalization_value: f32,
) -> Array3<f32> {
    let scaled = depth.mapv(|v| v / normalization_value);
    let resized = resize(&scaled, target_height, target_width);
    resized.insert_axis(ndarray::Axis(2))
}

/// Replace pixels above `threshold` or equal to zero with the mean of their
/// valid 4-neighbours.
///
/// Valid neighbours lie in `(0, threshold]` in the input. Pixels without one
/// become zero and are left for [`crate::inpaint::inpaint_biharmonic`].
pub fn inpaint_above_threshold(depth: &mut Array2<f32>, threshold: f32) {
    let source = depth.clone();
    let (w, h) = source.dim();
    let valid = |v: f32| v > 0.0 && v <= threshold;

    for ((x, y), value) in depth.indexed_iter_mut() {
        let current = source[[x, y]];
        if valid(current) {
            continue;
        }
        let mut sum = 0.0f32;
        let mut count = 0u32;
        let neighbours = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbours {
            if nx < w && ny < h && valid(source[[nx, ny]]) {
                sum += source[[nx, ny]];
                count += 1;
            }
        }
        *value = if count > 0 { sum / count as f32 } else { 0.0 };
    }
}

/// Render depth as an 8-bit image, `0` black and `max_depth` or beyond white.
///
/// Pixel `(x, y)` of the image is `depth[[x, y]]`.
#[must_use]
pub fn to_grayscale(depth: &Array2<f32>, max_depth: f32) -> GrayImage {
    let (w, h) = depth.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = depth[[x as usize, y as usize]];
        let scaled = if max_depth > 0.0 {
            (v / max_depth).clamp(0.0, 1.0) * 255.0
        } else {
            0.0
        };
        Luma([scaled.round() as u8])
    })
}
