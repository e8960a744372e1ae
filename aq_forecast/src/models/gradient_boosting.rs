//! Stochastic gradient boosting of shallow trees ("gb")

use crate::config::BoostingConfig;
use crate::error::{ForecastError, Result};
use crate::models::tree::{RegressionTree, TreeParams};
use crate::models::{check_row, check_training_set, normalize, Regressor, TrainedRegressor};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use tracing::debug;

/// Gradient boosting regressor with squared-error loss
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    config: BoostingConfig,
}

/// Fitted boosting ensemble
#[derive(Debug, Clone)]
pub struct TrainedBoosting {
    init: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
    width: usize,
    importances: Vec<f64>,
}

impl GradientBoosting {
    /// Create a new gradient boosting regressor
    pub fn new(config: BoostingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }
}

impl Regressor for GradientBoosting {
    fn name(&self) -> &str {
        "gb"
    }

    fn fit(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<Box<dyn TrainedRegressor>> {
        let width = check_training_set(self.name(), rows, targets)?;
        let cfg = &self.config;
        if cfg.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "Gradient boosting needs at least one stage".to_string(),
            ));
        }
        if !(cfg.learning_rate > 0.0 && cfg.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Learning rate must be in (0, 1], got {}",
                cfg.learning_rate
            )));
        }
        if !(cfg.subsample > 0.0 && cfg.subsample <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Subsample must be in (0, 1], got {}",
                cfg.subsample
            )));
        }

        let n = rows.len();
        let params = TreeParams {
            max_depth: cfg.max_depth,
            min_samples_split: cfg.min_samples_split,
            min_samples_leaf: cfg.min_samples_leaf,
            max_features: width,
        };
        let sample_size = ((cfg.subsample * n as f64).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let init = targets.iter().sum::<f64>() / n as f64;
        let mut fitted = vec![init; n];
        let mut residuals = vec![0.0; n];
        let mut stages = Vec::with_capacity(cfg.n_estimators);
        let mut importances = vec![0.0; width];

        for _ in 0..cfg.n_estimators {
            for i in 0..n {
                residuals[i] = targets[i] - fitted[i];
            }

            let subset = sample(&mut rng, n, sample_size).into_vec();
            let tree = RegressionTree::fit(rows, &residuals, &subset, params, &mut rng)?;

            for (f, row) in fitted.iter_mut().zip(rows.iter()) {
                *f += cfg.learning_rate * tree.predict(row);
            }
            for (acc, v) in importances.iter_mut().zip(normalize(tree.importances().to_vec())) {
                *acc += v;
            }
            stages.push(tree);
        }

        debug!(stages = stages.len(), rows = n, width, "gradient boosting fitted");

        Ok(Box::new(TrainedBoosting {
            init,
            learning_rate: cfg.learning_rate,
            stages,
            width,
            importances: normalize(importances),
        }))
    }
}

impl TrainedRegressor for TrainedBoosting {
    fn name(&self) -> &str {
        "gb"
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        check_row(self.name(), row, self.width)?;
        let value = self.init
            + self.learning_rate * self.stages.iter().map(|t| t.predict(row)).sum::<f64>();
        if !value.is_finite() {
            return Err(ForecastError::ModelError(
                "gb: non-finite prediction".to_string(),
            ));
        }
        Ok(value)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> BoostingConfig {
        BoostingConfig {
            n_estimators: 50,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 4,
            min_samples_leaf: 2,
            subsample: 0.8,
            seed: 3,
        }
    }

    #[test]
    fn test_reduces_error_versus_mean() {
        let rows: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..60).map(|i| (i as f64 / 6.0).sin() * 10.0).collect();
        let model = GradientBoosting::new(config()).fit(&rows, &targets).unwrap();

        let mean = targets.iter().sum::<f64>() / targets.len() as f64;
        let predictions = model.predict_batch(&rows).unwrap();
        let model_sse: f64 = predictions.iter().zip(&targets).map(|(p, t)| (p - t).powi(2)).sum();
        let mean_sse: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();
        assert!(model_sse < mean_sse * 0.5);
        assert!(model.prediction_spread(&rows[0]).is_none());
    }

    #[rstest]
    #[case(0.0, 0.8)]
    #[case(1.5, 0.8)]
    #[case(0.1, 0.0)]
    #[case(0.1, 1.2)]
    fn test_invalid_parameters(#[case] learning_rate: f64, #[case] subsample: f64) {
        let cfg = BoostingConfig {
            learning_rate,
            subsample,
            ..config()
        };
        let err = GradientBoosting::new(cfg)
            .fit(&[vec![1.0], vec![2.0]], &[1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter(_)));
    }

    #[test]
    fn test_constant_target() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let model = GradientBoosting::new(config()).fit(&rows, &[4.0; 20]).unwrap();
        assert!((model.predict(&[3.0]).unwrap() - 4.0).abs() < 1e-9);
    }
}
