//! Mask-guided depth inpainting
//!
//! Holes in a depth surface are filled region by region: the child surface
//! first, then floor and wall (or the foot for lying scans), and finally a
//! residual pass that removes whatever the region fills could not reach.

use cgm_rg_common::{stats, PoseType};
use ndarray::Array2;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use tracing::debug;

use crate::transform::inpaint_above_threshold;
use crate::InpaintError;

/// Below this missing fraction the child surface is filled by interpolation
const INTERPOLATION_MISSING_FRACTION: f32 = 0.10;
/// Above this missing fraction a line is filled by sampling around its mean
const SAMPLING_MISSING_FRACTION: f32 = 0.10;
/// Largest foot area, relative to the child area, that can be reinterpolated
const MAX_FOOT_TO_CHILD_RATIO: f32 = 0.30;
const TELEA_RADIUS: isize = 5;
const BIHARMONIC_MAX_ITERATIONS: usize = 300;
const BIHARMONIC_TOLERANCE: f32 = 1e-5;

/// Segmentation label values
pub mod labels {
    pub const CHILD: u8 = 1;
    pub const FLOOR: u8 = 2;
    pub const WALL: u8 = 3;
    pub const FOOT: u8 = 4;
}

/// Region masks for one depth frame, same shape as the depth array
#[derive(Debug, Clone)]
pub struct DepthMasks {
    pub child: Array2<bool>,
    pub floor: Array2<bool>,
    pub wall: Array2<bool>,
    pub foot: Array2<bool>,
}

impl DepthMasks {
    /// Split a segmentation label map into region masks
    #[must_use]
    pub fn from_labels(label_map: &Array2<u8>) -> Self {
        Self {
            child: label_map.mapv(|l| l == labels::CHILD),
            floor: label_map.mapv(|l| l == labels::FLOOR),
            wall: label_map.mapv(|l| l == labels::WALL),
            foot: label_map.mapv(|l| l == labels::FOOT),
        }
    }

    fn check_shape(&self, expected: (usize, usize)) -> Result<(), InpaintError> {
        for (name, mask) in [
            ("child", &self.child),
            ("floor", &self.floor),
            ("wall", &self.wall),
            ("foot", &self.foot),
        ] {
            if mask.dim() != expected {
                return Err(InpaintError::ShapeMismatch {
                    name,
                    expected,
                    found: mask.dim(),
                });
            }
        }
        Ok(())
    }
}

/// Orientation of the lines used by line-mean fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    /// Image rows: lanes along axis 0, one per axis-1 index
    Rows,
    /// Image columns: lanes along axis 1, one per axis-0 index
    Columns,
}

impl LineDirection {
    fn line_count(self, (w, h): (usize, usize)) -> usize {
        match self {
            LineDirection::Rows => h,
            LineDirection::Columns => w,
        }
    }

    fn line_len(self, (w, h): (usize, usize)) -> usize {
        match self {
            LineDirection::Rows => w,
            LineDirection::Columns => h,
        }
    }

    fn index(self, line: usize, pos: usize) -> [usize; 2] {
        match self {
            LineDirection::Rows => [pos, line],
            LineDirection::Columns => [line, pos],
        }
    }
}

fn is_valid(value: f32, max_depth: f32) -> bool {
    value > 0.0 && value <= max_depth
}

fn count_true(mask: &Array2<bool>) -> usize {
    mask.iter().filter(|m| **m).count()
}

/// Fill invalid masked pixels line by line from each line's interquartile mean.
///
/// A line missing more than 10% of its masked pixels is filled with samples
/// drawn uniformly from `[mean - delta, mean + delta]`. A line without any
/// valid pixel borrows the mean of an adjacent line, then the masked mean,
/// then the mean of the whole frame. Returns `false` if no reference value
/// exists at all.
pub fn inpaint_by_line_mean<R: Rng>(
    depth: &mut Array2<f32>,
    mask: &Array2<bool>,
    max_depth: f32,
    delta: f32,
    direction: LineDirection,
    rng: &mut R,
) -> bool {
    let dim = depth.dim();
    let lines = direction.line_count(dim);
    let len = direction.line_len(dim);

    let line_means: Vec<Option<f32>> = (0..lines)
        .map(|line| {
            let values: Vec<f64> = (0..len)
                .map(|pos| direction.index(line, pos))
                .filter(|&i| mask[i] && is_valid(depth[i], max_depth))
                .map(|i| f64::from(depth[i]))
                .collect();
            stats::interquartile_mean(&values).map(|m| m as f32)
        })
        .collect();

    let masked: Vec<f64> = depth
        .iter()
        .zip(mask.iter())
        .filter(|(v, m)| **m && is_valid(**v, max_depth))
        .map(|(v, _)| f64::from(*v))
        .collect();
    let frame: Vec<f64> = depth
        .iter()
        .filter(|v| is_valid(**v, max_depth))
        .map(|v| f64::from(*v))
        .collect();
    let fallback = stats::mean(&masked)
        .or_else(|| stats::mean(&frame))
        .map(|m| m as f32);

    for line in 0..lines {
        let region = (0..len)
            .filter(|&pos| mask[direction.index(line, pos)])
            .count();
        let missing: Vec<[usize; 2]> = (0..len)
            .map(|pos| direction.index(line, pos))
            .filter(|&i| mask[i] && !is_valid(depth[i], max_depth))
            .collect();
        if missing.is_empty() {
            continue;
        }

        let reference = line_means[line]
            .or_else(|| line.checked_sub(1).and_then(|prev| line_means[prev]))
            .or_else(|| line_means.get(line + 1).copied().flatten())
            .or(fallback);
        let Some(mean) = reference else {
            return false;
        };

        let sample = missing.len() as f32 / region as f32 > SAMPLING_MISSING_FRACTION && delta > 0.0;
        let low = (mean - delta).max(f32::MIN_POSITIVE);
        let high = mean + delta;
        for i in missing {
            let value = if sample {
                rng.random_range(low..=high)
            } else {
                mean
            };
            depth[i] = value.min(max_depth);
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
    Blocked,
}

#[derive(Debug, PartialEq)]
struct FrontPixel {
    arrival: f32,
    x: usize,
    y: usize,
}

impl Eq for FrontPixel {}

impl Ord for FrontPixel {
    // Reversed so the heap pops the earliest arrival
    fn cmp(&self, other: &Self) -> Ordering {
        other.arrival.total_cmp(&self.arrival)
    }
}

impl PartialOrd for FrontPixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Telea<'a> {
    depth: &'a mut Array2<f32>,
    flags: Array2<Flag>,
    arrival: Array2<f32>,
    max_depth: f32,
}

impl Telea<'_> {
    fn at(&self, x: isize, y: isize) -> Option<(usize, usize)> {
        let (w, h) = self.depth.dim();
        (x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h).then_some((x as usize, y as usize))
    }

    fn known_arrival(&self, x: isize, y: isize) -> Option<f32> {
        self.at(x, y)
            .filter(|&(kx, ky)| self.flags[[kx, ky]] == Flag::Known)
            .map(|(kx, ky)| self.arrival[[kx, ky]])
    }

    /// Upwind solution of `|∇T| = 1` from two orthogonal neighbours
    fn solve(a: Option<f32>, b: Option<f32>) -> f32 {
        match (a, b) {
            (Some(t1), Some(t2)) => {
                let disc = 2.0 - (t1 - t2) * (t1 - t2);
                if disc >= 0.0 {
                    let r = disc.sqrt();
                    let s = (t1 + t2 - r) / 2.0;
                    if s >= t1 && s >= t2 {
                        return s;
                    }
                    if s + r >= t1 && s + r >= t2 {
                        return s + r;
                    }
                }
                1.0 + t1.min(t2)
            }
            (Some(t), None) | (None, Some(t)) => 1.0 + t,
            (None, None) => f32::INFINITY,
        }
    }

    fn arrival_time(&self, x: isize, y: isize) -> f32 {
        let left = self.known_arrival(x - 1, y);
        let right = self.known_arrival(x + 1, y);
        let up = self.known_arrival(x, y - 1);
        let down = self.known_arrival(x, y + 1);
        [
            Self::solve(left, up),
            Self::solve(right, up),
            Self::solve(left, down),
            Self::solve(right, down),
        ]
        .into_iter()
        .fold(f32::INFINITY, f32::min)
    }

    fn gradient(&self, x: isize, y: isize, t: f32) -> (f32, f32) {
        let axis = |prev: Option<f32>, next: Option<f32>| match (prev, next) {
            (Some(p), Some(n)) => (n - p) / 2.0,
            (Some(p), None) => t - p,
            (None, Some(n)) => n - t,
            (None, None) => 0.0,
        };
        (
            axis(self.known_arrival(x - 1, y), self.known_arrival(x + 1, y)),
            axis(self.known_arrival(x, y - 1), self.known_arrival(x, y + 1)),
        )
    }

    /// Weighted average of filled pixels around `(x, y)`
    fn estimate(&self, x: isize, y: isize) -> f32 {
        let t = self.arrival[[x as usize, y as usize]];
        let (gx, gy) = self.gradient(x, y, t);
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;

        for dy in -TELEA_RADIUS..=TELEA_RADIUS {
            for dx in -TELEA_RADIUS..=TELEA_RADIUS {
                let dist2 = (dx * dx + dy * dy) as f32;
                if dist2 == 0.0 || dist2 > (TELEA_RADIUS * TELEA_RADIUS) as f32 {
                    continue;
                }
                let Some((kx, ky)) = self.at(x + dx, y + dy) else {
                    continue;
                };
                if !matches!(self.flags[[kx, ky]], Flag::Known | Flag::Band) {
                    continue;
                }
                let dist = dist2.sqrt();
                let mut dir = ((-dx as f32) * gx + (-dy as f32) * gy).abs() / dist;
                if dir <= 0.01 {
                    dir = 1e-6;
                }
                let dst = 1.0 / (dist2 * dist);
                let lev = 1.0 / (1.0 + (self.arrival[[kx, ky]] - t).abs());
                let w = dir * dst * lev;
                weighted += w * self.depth[[kx, ky]];
                total += w;
            }
        }

        if total > 0.0 {
            (weighted / total).min(self.max_depth)
        } else {
            0.0
        }
    }
}

/// Fill invalid pixels of `region` by fast-marching (Telea) interpolation.
///
/// Pixels in `blocked` never contribute to the fill. Filled values are clamped
/// to `max_depth`. Returns the number of filled pixels.
pub fn inpaint_by_interpolation(
    depth: &mut Array2<f32>,
    region: &Array2<bool>,
    blocked: Option<&Array2<bool>>,
    max_depth: f32,
) -> usize {
    let (w, h) = depth.dim();
    let flags = Array2::from_shape_fn((w, h), |(x, y)| {
        let valid = is_valid(depth[[x, y]], max_depth);
        let is_blocked = blocked.is_some_and(|b| b[[x, y]]);
        if region[[x, y]] && !valid {
            Flag::Inside
        } else if valid && !is_blocked {
            Flag::Known
        } else {
            Flag::Blocked
        }
    });
    let arrival = flags.mapv(|f| if f == Flag::Known { 0.0 } else { f32::INFINITY });

    let mut telea = Telea {
        depth,
        flags,
        arrival,
        max_depth,
    };

    let mut heap = BinaryHeap::new();
    for x in 0..w {
        for y in 0..h {
            if telea.flags[[x, y]] != Flag::Known {
                continue;
            }
            let (ix, iy) = (x as isize, y as isize);
            let touches_hole = [(ix - 1, iy), (ix + 1, iy), (ix, iy - 1), (ix, iy + 1)]
                .into_iter()
                .filter_map(|(nx, ny)| telea.at(nx, ny))
                .any(|n| telea.flags[n] == Flag::Inside);
            if touches_hole {
                telea.flags[[x, y]] = Flag::Band;
                heap.push(FrontPixel { arrival: 0.0, x, y });
            }
        }
    }

    let mut filled = 0;
    while let Some(FrontPixel { x, y, .. }) = heap.pop() {
        telea.flags[[x, y]] = Flag::Known;
        let (ix, iy) = (x as isize, y as isize);
        for (nx, ny) in [(ix - 1, iy), (ix + 1, iy), (ix, iy - 1), (ix, iy + 1)] {
            let Some(n) = telea.at(nx, ny) else {
                continue;
            };
            if telea.flags[n] != Flag::Inside {
                continue;
            }
            let t = telea.arrival_time(nx, ny);
            telea.arrival[n] = t;
            let value = telea.estimate(nx, ny);
            telea.depth[n] = value;
            telea.flags[n] = Flag::Band;
            heap.push(FrontPixel {
                arrival: t,
                x: n.0,
                y: n.1,
            });
            filled += 1;
        }
    }
    filled
}

/// Fill every zero pixel with a smooth biharmonic surface.
///
/// Unknown pixels are seeded by breadth-first propagation from the known
/// ones and then relaxed on the 13-point biharmonic stencil. Values stay
/// within the range of the known pixels. Returns `false` when the frame has
/// no known pixel.
pub fn inpaint_biharmonic(depth: &mut Array2<f32>) -> bool {
    let (w, h) = depth.dim();
    let unknown: Vec<(usize, usize)> = depth
        .indexed_iter()
        .filter(|(_, v)| !(**v > 0.0))
        .map(|(i, _)| i)
        .collect();
    if unknown.is_empty() {
        return true;
    }

    let (lo, hi) = depth
        .iter()
        .filter(|v| **v > 0.0)
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if !lo.is_finite() {
        return false;
    }

    // Seed
    let mut filled = depth.mapv(|v| v > 0.0);
    let mut queue: VecDeque<(usize, usize)> = depth
        .indexed_iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(i, _)| i)
        .collect();
    while let Some((x, y)) = queue.pop_front() {
        for (nx, ny) in [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ] {
            if nx >= w || ny >= h || filled[[nx, ny]] {
                continue;
            }
            let mut sum = 0.0;
            let mut count = 0.0;
            for (mx, my) in [
                (nx.wrapping_sub(1), ny),
                (nx + 1, ny),
                (nx, ny.wrapping_sub(1)),
                (nx, ny + 1),
            ] {
                if mx < w && my < h && filled[[mx, my]] {
                    sum += depth[[mx, my]];
                    count += 1.0;
                }
            }
            depth[[nx, ny]] = sum / count;
            filled[[nx, ny]] = true;
            queue.push_back((nx, ny));
        }
    }

    // Relax
    let clamp_x = |x: isize| x.clamp(0, w as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, h as isize - 1) as usize;
    for iteration in 0..BIHARMONIC_MAX_ITERATIONS {
        let mut max_change = 0.0f32;
        for &(x, y) in &unknown {
            let (ix, iy) = (x as isize, y as isize);
            let d = |dx: isize, dy: isize| depth[[clamp_x(ix + dx), clamp_y(iy + dy)]];
            let edges = d(-1, 0) + d(1, 0) + d(0, -1) + d(0, 1);
            let corners = d(-1, -1) + d(1, -1) + d(-1, 1) + d(1, 1);
            let far = d(-2, 0) + d(2, 0) + d(0, -2) + d(0, 2);
            let value = ((8.0 * edges - 2.0 * corners - far) / 20.0).clamp(lo, hi);
            max_change = max_change.max((value - depth[[x, y]]).abs());
            depth[[x, y]] = value;
        }
        if max_change < BIHARMONIC_TOLERANCE {
            debug!("Biharmonic fill converged after {} iterations", iteration + 1);
            break;
        }
    }
    true
}

/// Fill the child surface from child pixels only: interpolation when few
/// pixels are missing, line means otherwise.
fn inpaint_child<R: Rng>(
    depth: &mut Array2<f32>,
    child: &Array2<bool>,
    max_depth: f32,
    delta: f32,
    direction: LineDirection,
    rng: &mut R,
) {
    let area = count_true(child);
    if area == 0 {
        return;
    }
    let missing = depth
        .iter()
        .zip(child.iter())
        .filter(|(v, m)| **m && !is_valid(**v, max_depth))
        .count();
    let fraction = missing as f32 / area as f32;
    if fraction < INTERPOLATION_MISSING_FRACTION {
        let background = child.mapv(|c| !c);
        let filled = inpaint_by_interpolation(depth, child, Some(&background), max_depth);
        debug!("Interpolated {} child pixels", filled);
    } else {
        inpaint_by_line_mean(depth, child, max_depth, delta, direction, rng);
    }
}

/// Zero the foot region and reinterpolate it from non-child pixels.
///
/// Returns `false` when the foot covers too much of the child to be usable.
fn inpaint_foot(depth: &mut Array2<f32>, masks: &DepthMasks, max_depth: f32) -> bool {
    let foot_area = count_true(&masks.foot);
    if foot_area == 0 {
        return true;
    }
    let child_area = count_true(&masks.child);
    if (foot_area as f32) >= MAX_FOOT_TO_CHILD_RATIO * child_area as f32 {
        debug!(
            "Rejecting frame: foot area {} vs child area {}",
            foot_area, child_area
        );
        return false;
    }

    let region = Array2::from_shape_fn(depth.dim(), |i| masks.foot[i] && !masks.child[i]);
    for (value, inside) in depth.iter_mut().zip(region.iter()) {
        if *inside {
            *value = 0.0;
        }
    }
    inpaint_by_interpolation(depth, &region, Some(&masks.child), max_depth);
    true
}

/// Inpaint every region of a depth frame.
///
/// Standing scans fill child, floor and wall row by row. Lying scans fill
/// child and floor column by column, then reinterpolate the foot. A residual
/// pass follows, so a returned frame has no zero pixel. `Ok(None)` rejects
/// the frame (foot overlap too large, or nothing to interpolate from).
///
/// # Errors
/// Returns [`InpaintError::ShapeMismatch`] if a mask does not match `depth`.
pub fn inpaint_all_masks<R: Rng>(
    depth: &Array2<f32>,
    pose_type: PoseType,
    masks: &DepthMasks,
    max_depth: f32,
    delta: f32,
    rng: &mut R,
) -> Result<Option<Array2<f32>>, InpaintError> {
    masks.check_shape(depth.dim())?;
    let mut out = depth.clone();

    match pose_type {
        PoseType::Standing => {
            let rows = LineDirection::Rows;
            inpaint_child(&mut out, &masks.child, max_depth, delta, rows, rng);
            inpaint_by_line_mean(&mut out, &masks.floor, max_depth, delta, rows, rng);
            inpaint_by_line_mean(&mut out, &masks.wall, max_depth, delta, rows, rng);
        }
        PoseType::Lying => {
            let columns = LineDirection::Columns;
            inpaint_child(&mut out, &masks.child, max_depth, delta, columns, rng);
            inpaint_by_line_mean(&mut out, &masks.floor, max_depth, delta, columns, rng);
            if !inpaint_foot(&mut out, masks, max_depth) {
                return Ok(None);
            }
        }
    }

    inpaint_above_threshold(&mut out, max_depth);
    if !inpaint_biharmonic(&mut out) {
        return Ok(None);
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_biharmonic_fills_hole_smoothly() {
        let mut depth = Array2::from_shape_fn((9, 9), |(x, _)| 1.0 + x as f32 * 0.1);
        for x in 3..6 {
            for y in 3..6 {
                depth[[x, y]] = 0.0;
            }
        }
        assert!(inpaint_biharmonic(&mut depth));
        for x in 3..6 {
            let expected = 1.0 + x as f32 * 0.1;
            for y in 3..6 {
                assert!(
                    (depth[[x, y]] - expected).abs() < 0.05,
                    "[{x},{y}] = {}",
                    depth[[x, y]]
                );
            }
        }
    }

    #[test]
    fn test_biharmonic_without_known_pixels() {
        let mut depth = Array2::<f32>::zeros((4, 4));
        assert!(!inpaint_biharmonic(&mut depth));
    }

    #[test]
    fn test_interpolation_fills_small_hole() {
        let mut depth = Array2::from_elem((12, 12), 1.2f32);
        depth[[5, 5]] = 0.0;
        depth[[5, 6]] = 0.0;
        depth[[6, 6]] = 4.0;
        let region = Array2::from_elem((12, 12), true);

        let filled = inpaint_by_interpolation(&mut depth, &region, None, 3.0);
        assert_eq!(filled, 3);
        for i in [[5, 5], [5, 6], [6, 6]] {
            assert!((depth[i] - 1.2).abs() < 1e-4);
        }
    }

    #[test]
    fn test_interpolation_ignores_blocked_pixels() {
        let mut depth = Array2::from_elem((6, 6), 1.0f32);
        let mut blocked = Array2::from_elem((6, 6), false);
        for y in 0..6 {
            depth[[0, y]] = 2.5;
            blocked[[0, y]] = true;
        }
        depth[[1, 2]] = 0.0;
        let region = Array2::from_shape_fn((6, 6), |(x, y)| x == 1 && y == 2);

        inpaint_by_interpolation(&mut depth, &region, Some(&blocked), 3.0);
        assert!((depth[[1, 2]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_row_mean_uses_line_statistics() {
        // Two image rows (axis-1 index) with different floor depths
        let mut depth = Array2::from_shape_fn((10, 2), |(_, y)| if y == 0 { 1.0 } else { 2.0 });
        depth[[4, 0]] = 0.0;
        depth[[7, 1]] = 0.0;
        let mask = Array2::from_elem((10, 2), true);

        assert!(inpaint_by_line_mean(
            &mut depth,
            &mask,
            3.0,
            0.02,
            LineDirection::Rows,
            &mut rng()
        ));
        assert!((depth[[4, 0]] - 1.0).abs() < 1e-6);
        assert!((depth[[7, 1]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_line_is_sampled_within_delta() {
        let mut depth = Array2::from_elem((10, 1), 1.5f32);
        for x in 0..5 {
            depth[[x, 0]] = 0.0;
        }
        let mask = Array2::from_elem((10, 1), true);

        assert!(inpaint_by_line_mean(
            &mut depth,
            &mask,
            3.0,
            0.1,
            LineDirection::Rows,
            &mut rng()
        ));
        for x in 0..5 {
            assert!((1.4..=1.6).contains(&depth[[x, 0]]));
        }
    }

    #[test]
    fn test_empty_column_borrows_neighbour() {
        let mut depth = Array2::from_elem((3, 4), 0.8f32);
        for y in 0..4 {
            depth[[1, y]] = 0.0;
        }
        let mask = Array2::from_elem((3, 4), true);

        assert!(inpaint_by_line_mean(
            &mut depth,
            &mask,
            1.5,
            0.0,
            LineDirection::Columns,
            &mut rng()
        ));
        assert!(depth.row(1).iter().all(|v| (*v - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_no_reference_value() {
        let mut depth = Array2::<f32>::zeros((3, 3));
        let mask = Array2::from_elem((3, 3), true);
        assert!(!inpaint_by_line_mean(
            &mut depth,
            &mask,
            3.0,
            0.02,
            LineDirection::Rows,
            &mut rng()
        ));
    }

    #[test]
    fn test_large_foot_rejects_lying_frame() {
        let mut label_map = Array2::from_elem((8, 8), 0u8);
        for x in 0..4 {
            for y in 0..4 {
                label_map[[x, y]] = labels::CHILD;
            }
        }
        for x in 4..8 {
            for y in 0..2 {
                label_map[[x, y]] = labels::FOOT;
            }
        }
        let depth = Array2::from_elem((8, 8), 1.0f32);
        let masks = DepthMasks::from_labels(&label_map);

        let result = inpaint_all_masks(&depth, PoseType::Lying, &masks, 1.5, 0.02, &mut rng());
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn test_small_foot_is_reinterpolated() {
        let mut label_map = Array2::from_elem((10, 10), 0u8);
        for x in 0..6 {
            for y in 0..6 {
                label_map[[x, y]] = labels::CHILD;
            }
        }
        label_map[[8, 8]] = labels::FOOT;
        label_map[[8, 9]] = labels::FOOT;
        let depth = Array2::from_shape_fn((10, 10), |(x, y)| {
            if x < 6 && y < 6 {
                0.6
            } else {
                1.2
            }
        });
        let masks = DepthMasks::from_labels(&label_map);

        let out = inpaint_all_masks(&depth, PoseType::Lying, &masks, 1.5, 0.02, &mut rng())
            .unwrap()
            .unwrap();
        assert!((out[[8, 8]] - 1.2).abs() < 1e-4);
        assert!((out[[8, 9]] - 1.2).abs() < 1e-4);
    }

    #[test]
    fn test_standing_frame_has_no_holes() {
        let mut depth = Array2::from_elem((12, 10), 2.0f32);
        let mut label_map = Array2::from_elem((12, 10), labels::WALL);
        for x in 0..12 {
            for y in 7..10 {
                label_map[[x, y]] = labels::FLOOR;
                if x % 3 == 0 {
                    depth[[x, y]] = 0.0;
                }
            }
        }
        for x in 4..8 {
            for y in 2..8 {
                label_map[[x, y]] = labels::CHILD;
                depth[[x, y]] = 1.0;
            }
        }
        depth[[5, 4]] = 0.0;
        depth[[0, 0]] = 9.0;
        let masks = DepthMasks::from_labels(&label_map);

        let out = inpaint_all_masks(&depth, PoseType::Standing, &masks, 3.0, 0.02, &mut rng())
            .unwrap()
            .unwrap();
        assert!(out.iter().all(|v| *v > 0.0 && *v <= 3.0));
        assert!((out[[5, 4]] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let depth = Array2::from_elem((4, 4), 1.0f32);
        let masks = DepthMasks::from_labels(&Array2::from_elem((4, 5), 0u8));
        let err = inpaint_all_masks(&depth, PoseType::Standing, &masks, 3.0, 0.0, &mut rng())
            .unwrap_err();
        assert!(matches!(err, InpaintError::ShapeMismatch { name: "child", .. }));
    }
}
