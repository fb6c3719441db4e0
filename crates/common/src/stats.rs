//! Small descriptive statistics shared by inpainting and aggregation

/// Percentile with linear interpolation between closest ranks (numpy's default).
///
/// `sorted` must be ascending. Returns `None` for an empty slice.
#[must_use]
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Arithmetic mean, `None` for an empty slice
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sorted copy of the finite values
#[must_use]
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`
#[must_use]
pub fn tukey_fences(values: &[f64]) -> Option<(f64, f64)> {
    let sorted = sorted_finite(values);
    let q1 = percentile(&sorted, 25.0)?;
    let q3 = percentile(&sorted, 75.0)?;
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

/// Mean of the values lying between the first and third quartile.
///
/// Falls back to the plain mean when the interquartile band is empty.
#[must_use]
pub fn interquartile_mean(values: &[f64]) -> Option<f64> {
    let sorted = sorted_finite(values);
    let q1 = percentile(&sorted, 25.0)?;
    let q3 = percentile(&sorted, 75.0)?;
    let band: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| *v >= q1 && *v <= q3)
        .collect();
    mean(&band).or_else(|| mean(&sorted))
}
