//! Scan-level aggregation of per-artifact predictions
//!
//! Predictions are cleaned with Tukey fences, repeated until nothing more is
//! dropped. When at least [`LOF_MIN_SAMPLES`] remain, a Local Outlier Factor
//! pass with [`LOF_NEIGHBORS`] neighbours removes density outliers. Both means
//! are reported; they differ whenever the LOF pass drops a value.

use cgm_rg_common::stats::{mean, tukey_fences};
use serde_json::{Map, Value};

pub const LOF_NEIGHBORS: usize = 5;
pub const LOF_MIN_SAMPLES: usize = 9;
/// Scores above this are outliers
pub const LOF_THRESHOLD: f64 = 1.5;
const LRD_EPSILON: f64 = 1e-10;

/// Drop values outside `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]` until stable.
///
/// Non-finite values are dropped; the order of the kept values is preserved.
/// The result is a fixed point: applying it again returns the same values.
#[must_use]
pub fn remove_outliers(values: &[f64]) -> Vec<f64> {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    loop {
        let Some((low, high)) = tukey_fences(&kept) else {
            return kept;
        };
        let before = kept.len();
        kept.retain(|v| *v >= low && *v <= high);
        if kept.len() == before {
            return kept;
        }
    }
}

/// Local Outlier Factor of every value, with `k` neighbours
#[must_use]
pub fn local_outlier_factors(values: &[f64], k: usize) -> Vec<f64> {
    let n = values.len();
    if n < 2 || k == 0 {
        return vec![1.0; n];
    }
    let k = k.min(n - 1);

    // Neighbour lists and k-distance per point
    let mut neighbours: Vec<Vec<usize>> = Vec::with_capacity(n);
    let mut k_distance = Vec::with_capacity(n);
    for (i, &p) in values.iter().enumerate() {
        let mut others: Vec<(f64, usize)> = values
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, &o)| ((p - o).abs(), j))
            .collect();
        others.sort_by(|a, b| a.0.total_cmp(&b.0));
        let kd = others[k - 1].0;
        neighbours.push(
            others
                .iter()
                .take_while(|(d, _)| *d <= kd)
                .map(|(_, j)| *j)
                .collect(),
        );
        k_distance.push(kd);
    }

    let lrd: Vec<f64> = (0..n)
        .map(|i| {
            let reach: f64 = neighbours[i]
                .iter()
                .map(|&o| k_distance[o].max((values[i] - values[o]).abs()))
                .sum::<f64>()
                / neighbours[i].len() as f64;
            1.0 / (reach + LRD_EPSILON)
        })
        .collect();

    (0..n)
        .map(|i| {
            neighbours[i].iter().map(|&o| lrd[o]).sum::<f64>()
                / neighbours[i].len() as f64
                / lrd[i]
        })
        .collect()
}

/// Keep values whose LOF score is within [`LOF_THRESHOLD`].
///
/// Fewer than [`LOF_MIN_SAMPLES`] values are returned unchanged.
#[must_use]
pub fn lof_filter(values: &[f64]) -> Vec<f64> {
    if values.len() < LOF_MIN_SAMPLES {
        return values.to_vec();
    }
    local_outlier_factors(values, LOF_NEIGHBORS)
        .into_iter()
        .zip(values)
        .filter(|(score, _)| *score <= LOF_THRESHOLD)
        .map(|(_, v)| *v)
        .collect()
}

/// Means reported for a scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanAggregate {
    /// Mean after IQR removal
    pub mean: f64,
    /// Mean after IQR removal and the LOF pass
    pub lof_mean: f64,
    pub samples: usize,
    pub lof_samples: usize,
}

impl ScanAggregate {
    /// `None` when no finite prediction survives outlier removal
    #[must_use]
    pub fn compute(predictions: &[f64]) -> Option<Self> {
        let cleaned = remove_outliers(predictions);
        let mean_value = mean(&cleaned)?;
        let filtered = lof_filter(&cleaned);
        Some(Self {
            mean: mean_value,
            lof_mean: mean(&filtered).unwrap_or(mean_value),
            samples: cleaned.len(),
            lof_samples: filtered.len(),
        })
    }

    /// Result data keyed by target: `mean_<target>` and `lof_mean_<target>`
    #[must_use]
    pub fn to_data(&self, target: &str) -> Value {
        let mut data = Map::new();
        data.insert(format!("mean_{target}"), Value::from(self.mean));
        data.insert(format!("lof_mean_{target}"), Value::from(self.lof_mean));
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_outliers_drops_far_values() {
        let cleaned = remove_outliers(&[80.0, 81.0, 82.0, 81.5, 250.0]);
        assert_eq!(cleaned, vec![80.0, 81.0, 82.0, 81.5]);
    }

    #[test]
    fn test_remove_outliers_repeats_until_stable() {
        let values = [10.0, 10.1, 10.2, 10.3, 10.4, 12.0, 40.0];
        let once = remove_outliers(&values);
        assert_eq!(remove_outliers(&once), once);
        assert!(!once.contains(&40.0));
    }

    #[test]
    fn test_non_finite_values_dropped() {
        assert_eq!(remove_outliers(&[1.0, f64::NAN, 2.0]), vec![1.0, 2.0]);
        assert!(remove_outliers(&[]).is_empty());
    }

    #[test]
    fn test_lof_flags_isolated_point() {
        let values = [
            90.0, 90.2, 90.4, 90.1, 90.3, 90.5, 90.2, 90.4, 90.1, 93.0,
        ];
        let scores = local_outlier_factors(&values, LOF_NEIGHBORS);
        assert!(scores[9] > LOF_THRESHOLD);
        assert!(scores[..9].iter().all(|s| *s <= LOF_THRESHOLD));
        assert_eq!(lof_filter(&values).len(), 9);
    }

    #[test]
    fn test_lof_skipped_for_small_sets() {
        let values = [1.0, 1.1, 5.0];
        assert_eq!(lof_filter(&values), values.to_vec());
    }

    #[test]
    fn test_aggregate_reports_both_means() {
        // 92.5 sits inside the Tukey fences but in a sparse region
        let values = [80.0, 81.0, 82.0, 83.0, 84.0, 85.0, 86.0, 87.0, 88.0, 92.5];
        let aggregate = ScanAggregate::compute(&values).unwrap();
        assert_eq!(aggregate.samples, 10);
        assert_eq!(aggregate.lof_samples, 9);
        assert!(aggregate.lof_mean < aggregate.mean);

        let data = aggregate.to_data("height");
        assert!(data.get("mean_height").is_some());
        assert!(data.get("lof_mean_height").is_some());
        assert!(ScanAggregate::compute(&[f64::NAN]).is_none());
    }
}
