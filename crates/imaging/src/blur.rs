//! Face-region blurring

use image::{imageops, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::BoundingBox;

/// Smallest sigma applied to a region
const MIN_SIGMA: f32 = 2.0;

/// Gaussian-blur every box in place.
///
/// Sigma scales with the box size so that larger faces are equally
/// unrecognisable. Boxes outside the image are ignored. Returns the number of
/// regions blurred.
pub fn blur_regions(image: &mut RgbImage, boxes: &[BoundingBox]) -> usize {
    let (width, height) = image.dimensions();
    let mut blurred = 0;
    for bbox in boxes {
        let Some((x, y, w, h)) = bbox.clip_to(width, height) else {
            debug!("Skipping face box outside the image: {:?}", bbox);
            continue;
        };
        let region = imageops::crop_imm(image, x, y, w, h).to_image();
        let sigma = (w.max(h) as f32 / 4.0).max(MIN_SIGMA);
        let region = gaussian_blur_f32(&region, sigma);
        imageops::replace(image, &region, i64::from(x), i64::from(y));
        blurred += 1;
    }
    blurred
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_blur_only_touches_box() {
        let mut img = checkerboard(32);
        let original = img.clone();
        let count = blur_regions(&mut img, &[BoundingBox::new(8.0, 8.0, 24.0, 24.0)]);
        assert_eq!(count, 1);

        // Outside the box nothing changes
        assert_eq!(img.get_pixel(0, 0), original.get_pixel(0, 0));
        assert_eq!(img.get_pixel(31, 31), original.get_pixel(31, 31));

        // Inside, the checkerboard is smoothed toward grey
        let centre = img.get_pixel(16, 16)[0];
        assert!((64..=192).contains(&centre), "centre = {centre}");
    }

    #[test]
    fn test_boxes_outside_are_skipped() {
        let mut img = checkerboard(8);
        let original = img.clone();
        let count = blur_regions(&mut img, &[BoundingBox::new(20.0, 20.0, 30.0, 30.0)]);
        assert_eq!(count, 0);
        assert_eq!(img, original);
    }
}
