//! Descriptive and order statistics over finite values
//!
//! Every function here ignores non-finite entries, so a column that still
//! carries missing markers (NaN) yields statistics over what is present.

use statrs::statistics::Statistics;

/// Collect the finite entries of a slice
fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean of the finite values, `None` when there are none
pub fn mean(values: &[f64]) -> Option<f64> {
    let data = finite(values);
    if data.is_empty() {
        return None;
    }
    Some(data.iter().mean())
}

/// Sample standard deviation (n - 1 denominator), `None` below two values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let data = finite(values);
    if data.len() < 2 {
        return None;
    }
    let std = data.iter().std_dev();
    std.is_finite().then_some(std)
}

/// Population standard deviation (n denominator), `None` when empty
pub fn population_std(values: &[f64]) -> Option<f64> {
    let data = finite(values);
    if data.is_empty() {
        return None;
    }
    let std = data.iter().population_std_dev();
    std.is_finite().then_some(std)
}

/// Quantile with linear interpolation between closest ranks.
///
/// `q` is clamped to `[0, 1]`. Returns `None` when no finite value exists.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut data = finite(values);
    if data.is_empty() {
        return None;
    }
    data.sort_by(|a, b| a.total_cmp(b));
    Some(quantile_sorted(&data, q))
}

/// Quantile of an already sorted, non-empty, finite slice
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let q = if q.is_nan() { 0.5 } else { q.clamp(0.0, 1.0) };
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Median of the finite values
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_skips_missing() {
        let values = [1.0, f64::NAN, 3.0, f64::INFINITY];
        assert_relative_eq!(mean(&values).unwrap(), 2.0);
        assert!(mean(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_standard_deviations() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(population_std(&values).unwrap(), 2.0);
        assert_relative_eq!(sample_std(&values).unwrap(), 2.138_089_935, epsilon = 1e-6);
        assert!(sample_std(&[1.0]).is_none());
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(quantile(&values, 0.25).unwrap(), 1.75);
        assert_relative_eq!(quantile(&values, 0.75).unwrap(), 3.25);
        assert_relative_eq!(median(&values).unwrap(), 2.5);
        assert_relative_eq!(quantile(&values, 1.0).unwrap(), 4.0);
    }

    #[test]
    fn test_quantile_of_empty_is_none() {
        assert!(quantile(&[], 0.5).is_none());
        assert!(median(&[f64::NAN, f64::NEG_INFINITY]).is_none());
    }
}
