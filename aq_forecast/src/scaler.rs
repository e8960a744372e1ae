//! Robust (median/IQR) scaling of features and target

use crate::error::{ForecastError, Result};
use aq_math::{median, quantile};
use serde::{Deserialize, Serialize};

/// Center and scale of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    /// Median of the fitted values
    pub center: f64,
    /// Interquartile range; 1.0 when the range is zero or undefined
    pub scale: f64,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            center: 0.0,
            scale: 1.0,
        }
    }
}

impl ScaleParams {
    /// Fit on a column of values
    pub fn fit(values: &[f64]) -> Result<Self> {
        let center = median(values).ok_or_else(|| {
            ForecastError::InvalidParameter("Cannot fit scaler on empty or non-finite data".to_string())
        })?;
        let iqr = match (quantile(values, 0.25), quantile(values, 0.75)) {
            (Some(q1), Some(q3)) => q3 - q1,
            _ => 0.0,
        };
        let scale = if iqr.is_finite() && iqr > 0.0 { iqr } else { 1.0 };
        Ok(Self { center, scale })
    }

    #[inline]
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }

    #[inline]
    pub fn inverse(&self, value: f64) -> f64 {
        value * self.scale + self.center
    }
}

/// Per-column robust scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    params: Vec<ScaleParams>,
}

impl RobustScaler {
    /// Fit one [`ScaleParams`] per column of `rows`
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map(Vec::len).ok_or_else(|| {
            ForecastError::InvalidParameter("Cannot fit scaler on zero rows".to_string())
        })?;

        if rows.iter().any(|r| r.len() != width) {
            return Err(ForecastError::InvalidParameter(
                "Rows have inconsistent widths".to_string(),
            ));
        }

        let params = (0..width)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                ScaleParams::fit(&column)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { params })
    }

    pub fn params(&self) -> &[ScaleParams] {
        &self.params
    }

    /// Number of columns the scaler was fitted on
    pub fn width(&self) -> usize {
        self.params.len()
    }

    /// Scale a single row
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.params.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Expected {} columns, got {}",
                self.params.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.params.iter())
            .map(|(v, p)| p.transform(*v))
            .collect())
    }

    /// Scale many rows
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    /// Undo [`transform_row`](Self::transform_row)
    pub fn inverse_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.params.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Expected {} columns, got {}",
                self.params.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.params.iter())
            .map(|(v, p)| p.inverse(*v))
            .collect())
    }
}

/// Fitted feature and target scalers, always used as a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub features: RobustScaler,
    pub target: ScaleParams,
}

impl ScalerState {
    /// Fit both scalers on training rows and targets
    pub fn fit(rows: &[Vec<f64>], targets: &[f64]) -> Result<Self> {
        Ok(Self {
            features: RobustScaler::fit(rows)?,
            target: ScaleParams::fit(targets)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_params_fit() {
        let params = ScaleParams::fit(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_relative_eq!(params.center, 3.0);
        assert_relative_eq!(params.scale, 2.0);
    }

    #[test]
    fn test_degenerate_scale_is_one() {
        let params = ScaleParams::fit(&[7.0; 10]).unwrap();
        assert_eq!(params.center, 7.0);
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.transform(7.0), 0.0);
    }

    #[test]
    fn test_round_trip() {
        let rows = vec![
            vec![1.0, 100.0, 0.0],
            vec![2.0, 250.0, 0.0],
            vec![5.0, 90.0, 1.0],
            vec![9.0, 310.0, 0.0],
        ];
        let scaler = RobustScaler::fit(&rows).unwrap();

        for row in &rows {
            let scaled = scaler.transform_row(row).unwrap();
            let restored = scaler.inverse_row(&scaled).unwrap();
            for (a, b) in restored.iter().zip(row.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = RobustScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(scaler.transform_row(&[1.0]).is_err());
        assert!(RobustScaler::fit(&[]).is_err());
    }
}
