//! RGB/depth alignment check
//!
//! Both images are reduced to Canny edge maps at the depth resolution and
//! compared with the structural similarity index.

use image::{imageops, GrayImage, RgbImage};
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const ALIGNED_THRESHOLD: f64 = 0.75;

const SSIM_WINDOW: usize = 7;
const SSIM_DATA_RANGE: f64 = 255.0;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentStatus {
    Aligned,
    #[serde(rename = "Not Aligned")]
    NotAligned,
}

/// Outcome of one RGB/depth pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// SSIM of the edge maps, rounded to 2 decimals
    pub similarity_index: f64,
    pub status: AlignmentStatus,
}

/// Compare an RGB frame with the grayscale rendering of its depth frame.
///
/// The RGB image is resized to the depth image's resolution first.
#[must_use]
pub fn check_rgb_depth_alignment(rgb: &RgbImage, depth: &GrayImage) -> AlignmentReport {
    let (width, height) = depth.dimensions();
    let gray = imageops::grayscale(rgb);
    let gray = imageops::resize(&gray, width, height, imageops::FilterType::Triangle);

    let rgb_edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let depth_edges = canny(depth, CANNY_LOW, CANNY_HIGH);

    let similarity_index = (structural_similarity(&rgb_edges, &depth_edges) * 100.0).round() / 100.0;
    let status = if similarity_index >= ALIGNED_THRESHOLD {
        AlignmentStatus::Aligned
    } else {
        AlignmentStatus::NotAligned
    };
    AlignmentReport {
        similarity_index,
        status,
    }
}

/// Mean SSIM over 7x7 uniform windows (sample covariance).
///
/// Images smaller than one window are compared as a single window.
/// Both images must have equal dimensions.
#[must_use]
pub fn structural_similarity(a: &GrayImage, b: &GrayImage) -> f64 {
    let (width, height) = a.dimensions();
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return 1.0;
    }

    let c1 = (SSIM_K1 * SSIM_DATA_RANGE).powi(2);
    let c2 = (SSIM_K2 * SSIM_DATA_RANGE).powi(2);
    let pixel = |img: &GrayImage, x: usize, y: usize| f64::from(img.get_pixel(x as u32, y as u32)[0]);

    let window_ssim = |x0: usize, y0: usize, ww: usize, wh: usize| -> f64 {
        let n = (ww * wh) as f64;
        let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for y in y0..y0 + wh {
            for x in x0..x0 + ww {
                let pa = pixel(a, x, y);
                let pb = pixel(b, x, y);
                sa += pa;
                sb += pb;
                saa += pa * pa;
                sbb += pb * pb;
                sab += pa * pb;
            }
        }
        let (ma, mb) = (sa / n, sb / n);
        let norm = if n > 1.0 { n / (n - 1.0) } else { 1.0 };
        let va = (saa / n - ma * ma) * norm;
        let vb = (sbb / n - mb * mb) * norm;
        let cov = (sab / n - ma * mb) * norm;
        ((2.0 * ma * mb + c1) * (2.0 * cov + c2)) / ((ma * ma + mb * mb + c1) * (va + vb + c2))
    };

    if w < SSIM_WINDOW || h < SSIM_WINDOW {
        return window_ssim(0, 0, w, h);
    }

    let mut total = 0.0;
    let mut count = 0usize;
    for y0 in 0..=h - SSIM_WINDOW {
        for x0 in 0..=w - SSIM_WINDOW {
            total += window_ssim(x0, y0, SSIM_WINDOW, SSIM_WINDOW);
            count += 1;
        }
    }
    total / count as f64
}
