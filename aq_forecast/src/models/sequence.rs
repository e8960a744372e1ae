//! Linear readout trained by gradient descent ("seq")
//!
//! Compiled only with the `sequence-model` feature. It shares the regressor
//! traits with the tree ensembles, so the ensemble needs no special casing.

use crate::error::{ForecastError, Result};
use crate::models::{check_row, check_training_set, normalize, Regressor, TrainedRegressor};
use tracing::debug;

/// Ridge-regularised linear regressor fitted by full-batch gradient descent
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRegressor {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for SequenceRegressor {
    fn default() -> Self {
        Self {
            epochs: 300,
            learning_rate: 0.05,
            l2: 1e-3,
        }
    }
}

/// Fitted linear readout
#[derive(Debug, Clone)]
pub struct TrainedSequence {
    weights: Vec<f64>,
    bias: f64,
}

impl Regressor for SequenceRegressor {
    fn name(&self) -> &str {
        "seq"
    }

    fn fit(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<Box<dyn TrainedRegressor>> {
        let width = check_training_set(self.name(), rows, targets)?;
        if self.epochs == 0 || !(self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidParameter(
                "seq: epochs and learning rate must be positive".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = targets.iter().sum::<f64>() / n;
        let mut grad = vec![0.0; width];

        for _ in 0..self.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;

            for (row, target) in rows.iter().zip(targets.iter()) {
                let err = dot(&weights, row) + bias - target;
                grad_bias += err;
                for (g, x) in grad.iter_mut().zip(row.iter()) {
                    *g += err * x;
                }
            }

            for (w, g) in weights.iter_mut().zip(grad.iter()) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_bias / n;

            if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
                return Err(ForecastError::ModelError(
                    "seq: gradient descent diverged".to_string(),
                ));
            }
        }

        debug!(epochs = self.epochs, width, "sequence readout fitted");
        Ok(Box::new(TrainedSequence { weights, bias }))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl TrainedRegressor for TrainedSequence {
    fn name(&self) -> &str {
        "seq"
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        check_row(self.name(), row, self.weights.len())?;
        Ok(dot(&self.weights, row) + self.bias)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(normalize(self.weights.iter().map(|w| w.abs()).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learns_linear_relation() {
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![(i as f64 - 25.0) / 25.0]).collect();
        let targets: Vec<f64> = rows.iter().map(|r| 3.0 * r[0] + 1.0).collect();
        let model = SequenceRegressor {
            epochs: 2000,
            learning_rate: 0.1,
            l2: 0.0,
        }
        .fit(&rows, &targets)
        .unwrap();

        assert!((model.predict(&[0.5]).unwrap() - 2.5).abs() < 0.05);
    }
}
