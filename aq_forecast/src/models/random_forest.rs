//! Bagged regression trees ("rf")

use crate::config::ForestConfig;
use crate::error::{ForecastError, Result};
use crate::models::tree::{RegressionTree, TreeParams};
use crate::models::{check_row, check_training_set, normalize, Regressor, TrainedRegressor};
use aq_math::population_std;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

/// Random forest regressor
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
}

/// Fitted random forest
#[derive(Debug, Clone)]
pub struct TrainedForest {
    trees: Vec<RegressionTree>,
    width: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Create a new random forest
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

impl Regressor for RandomForest {
    fn name(&self) -> &str {
        "rf"
    }

    fn fit(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<Box<dyn TrainedRegressor>> {
        let width = check_training_set(self.name(), rows, targets)?;
        if self.config.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "Random forest needs at least one tree".to_string(),
            ));
        }

        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: self.config.max_features.resolve(width),
        };
        let n = rows.len();
        let seed = self.config.seed;

        // Each tree owns an rng seeded from its index, so the forest does not
        // depend on thread scheduling
        let trees = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(rows, targets, &bootstrap, params, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut importances = vec![0.0; width];
        for tree in &trees {
            for (acc, v) in importances.iter_mut().zip(normalize(tree.importances().to_vec())) {
                *acc += v;
            }
        }

        debug!(trees = trees.len(), rows = n, width, "random forest fitted");

        Ok(Box::new(TrainedForest {
            trees,
            width,
            importances: normalize(importances),
        }))
    }
}

impl TrainedForest {
    fn tree_predictions(&self, row: &[f64]) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(row)).collect()
    }

    /// Number of trees
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

impl TrainedRegressor for TrainedForest {
    fn name(&self) -> &str {
        "rf"
    }

    fn predict(&self, row: &[f64]) -> Result<f64> {
        check_row(self.name(), row, self.width)?;
        let predictions = self.tree_predictions(row);
        let value = predictions.iter().sum::<f64>() / predictions.len().max(1) as f64;
        if !value.is_finite() {
            return Err(ForecastError::ModelError(
                "rf: non-finite prediction".to_string(),
            ));
        }
        Ok(value)
    }

    fn prediction_spread(&self, row: &[f64]) -> Option<f64> {
        if row.len() != self.width {
            return None;
        }
        population_std(&self.tree_predictions(row))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxFeatures;
    use approx::assert_relative_eq;

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 20,
            max_depth: 6,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: MaxFeatures::All,
            seed: 7,
        }
    }

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..80).map(|i| vec![i as f64 / 10.0, (i % 3) as f64]).collect();
        let targets = rows.iter().map(|r| 2.0 * r[0]).collect();
        (rows, targets)
    }

    #[test]
    fn test_fits_linear_trend() {
        let (rows, targets) = linear_data();
        let model = RandomForest::new(small_config()).fit(&rows, &targets).unwrap();

        let low = model.predict(&[1.0, 0.0]).unwrap();
        let high = model.predict(&[7.0, 0.0]).unwrap();
        assert!(high > low);
        assert!((high - 14.0).abs() < 2.0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (rows, targets) = linear_data();
        let a = RandomForest::new(small_config()).fit(&rows, &targets).unwrap();
        let b = RandomForest::new(small_config()).fit(&rows, &targets).unwrap();

        assert_eq!(a.predict(&[3.3, 1.0]).unwrap(), b.predict(&[3.3, 1.0]).unwrap());
    }

    #[test]
    fn test_importances_and_spread() {
        let (rows, targets) = linear_data();
        let model = RandomForest::new(small_config()).fit(&rows, &targets).unwrap();

        let importances = model.feature_importances().unwrap();
        assert_relative_eq!(importances.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(importances[0] > importances[1]);
        assert!(model.prediction_spread(&[4.0, 1.0]).unwrap() >= 0.0);
    }

    #[test]
    fn test_wrong_width() {
        let (rows, targets) = linear_data();
        let model = RandomForest::new(small_config()).fit(&rows, &targets).unwrap();
        assert!(model.predict(&[1.0]).is_err());
        assert!(model.prediction_spread(&[1.0]).is_none());
    }
}
