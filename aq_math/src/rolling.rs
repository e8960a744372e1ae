//! Backward-looking rolling window calculations
//!
//! All window functions use minimum-period semantics: a window larger than
//! the history available at a given index uses all of that history instead
//! of producing a gap. Values at index `i` only depend on `values[..=i]`.

use crate::stats::quantile_sorted;
use crate::{MathError, Result};
use statrs::statistics::Statistics;

fn check_window(window: usize) -> Result<()> {
    if window == 0 {
        return Err(MathError::InvalidInput(
            "Window size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Finite values of the window ending at `index` (inclusive)
fn window_at(values: &[f64], index: usize, window: usize) -> Vec<f64> {
    let start = (index + 1).saturating_sub(window);
    values[start..=index]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect()
}

/// Rolling mean with a minimum period of one observation.
///
/// Indices whose window holds no finite value yield NaN.
pub fn rolling_mean(values: &[f64], window: usize) -> Result<Vec<f64>> {
    check_window(window)?;

    Ok((0..values.len())
        .map(|i| {
            let data = window_at(values, i, window);
            if data.is_empty() {
                f64::NAN
            } else {
                data.iter().mean()
            }
        })
        .collect())
}

/// Rolling sample standard deviation.
///
/// Windows with fewer than two finite values yield NaN, matching the
/// behaviour of an (n - 1) estimator on a single point.
pub fn rolling_std(values: &[f64], window: usize) -> Result<Vec<f64>> {
    check_window(window)?;

    Ok((0..values.len())
        .map(|i| {
            let data = window_at(values, i, window);
            if data.len() < 2 {
                f64::NAN
            } else {
                data.iter().std_dev()
            }
        })
        .collect())
}

/// Rolling quantile with linear interpolation inside each window
pub fn rolling_quantile(values: &[f64], window: usize, q: f64) -> Result<Vec<f64>> {
    check_window(window)?;
    if !(0.0..=1.0).contains(&q) {
        return Err(MathError::InvalidInput(format!(
            "Quantile must be within [0, 1], got {}",
            q
        )));
    }

    Ok((0..values.len())
        .map(|i| {
            let mut data = window_at(values, i, window);
            if data.is_empty() {
                return f64::NAN;
            }
            data.sort_by(|a, b| a.total_cmp(b));
            quantile_sorted(&data, q)
        })
        .collect())
}

/// Difference against the value `lag` steps earlier; NaN where undefined
pub fn diff(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < lag {
                f64::NAN
            } else {
                values[i] - values[i - lag]
            }
        })
        .collect()
}

/// Fractional change against the value `lag` steps earlier.
///
/// A zero base produces an infinite (or NaN) entry; callers are expected to
/// sanitize the result.
pub fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < lag {
                f64::NAN
            } else {
                (values[i] - values[i - lag]) / values[i - lag]
            }
        })
        .collect()
}

/// Shift a series `lag` steps forward in time, back-filling the leading gap
/// with the first available lagged value and falling back to the series mean
/// when the lag exceeds the history.
pub fn lag_backfilled(values: &[f64], lag: usize) -> Vec<f64> {
    let n = values.len();
    if lag == 0 {
        return values.to_vec();
    }
    if lag >= n {
        let fill = crate::stats::mean(values).unwrap_or(0.0);
        return vec![fill; n];
    }

    let mut shifted = Vec::with_capacity(n);
    // The first defined lagged value is values[0], found at index `lag`
    let first = values[0];
    for i in 0..n {
        if i < lag {
            shifted.push(first);
        } else {
            shifted.push(values[i - lag]);
        }
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_rolling_mean_minimum_periods() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let means = rolling_mean(&values, 3).unwrap();

        assert_eq!(means.len(), values.len());
        assert_relative_eq!(means[0], 1.0);
        assert_relative_eq!(means[1], 1.5);
        assert_relative_eq!(means[2], 2.0);
        assert_relative_eq!(means[4], 4.0);
    }

    #[test]
    fn test_rolling_mean_window_larger_than_history() {
        let values = [2.0, 4.0];
        let means = rolling_mean(&values, 24).unwrap();
        assert_relative_eq!(means[1], 3.0);
    }

    #[test]
    fn test_rolling_mean_rejects_zero_window() {
        assert!(rolling_mean(&[1.0], 0).is_err());
        assert!(rolling_std(&[1.0], 0).is_err());
        assert!(rolling_quantile(&[1.0], 0, 0.5).is_err());
    }

    #[test]
    fn test_rolling_std_first_value_undefined() {
        let values = [1.0, 3.0, 5.0];
        let stds = rolling_std(&values, 6).unwrap();

        assert!(stds[0].is_nan());
        assert_relative_eq!(stds[1], 2.0_f64.sqrt());
        assert_relative_eq!(stds[2], 2.0);
    }

    #[test]
    fn test_rolling_quantile() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let q25 = rolling_quantile(&values, 24, 0.25).unwrap();
        let q75 = rolling_quantile(&values, 24, 0.75).unwrap();

        assert_relative_eq!(q25[0], 1.0);
        assert_relative_eq!(q25[3], 1.75);
        assert_relative_eq!(q75[3], 3.25);
        assert!(rolling_quantile(&values, 3, 1.5).is_err());
    }

    #[rstest]
    #[case(1, vec![f64::NAN, 2.0, 2.0, 2.0])]
    #[case(2, vec![f64::NAN, f64::NAN, 4.0, 4.0])]
    fn test_diff(#[case] lag: usize, #[case] expected: Vec<f64>) {
        let values = [1.0, 3.0, 5.0, 7.0];
        let result = diff(&values, lag);
        for (got, want) in result.iter().zip(expected.iter()) {
            if want.is_nan() {
                assert!(got.is_nan());
            } else {
                assert_relative_eq!(*got, *want);
            }
        }
    }

    #[test]
    fn test_pct_change_zero_base_is_not_finite() {
        let values = [0.0, 5.0, 10.0];
        let pct = pct_change(&values, 1);

        assert!(pct[0].is_nan());
        assert!(pct[1].is_infinite());
        assert_relative_eq!(pct[2], 1.0);
    }

    #[test]
    fn test_lag_backfilled() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(lag_backfilled(&values, 1), vec![10.0, 10.0, 20.0, 30.0]);
        assert_eq!(lag_backfilled(&values, 2), vec![10.0, 10.0, 10.0, 20.0]);
        assert_eq!(lag_backfilled(&values, 4), vec![25.0; 4]);
        assert_eq!(lag_backfilled(&values, 0), values.to_vec());
    }
}
