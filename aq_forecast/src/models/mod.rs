//! Regressor variants over scaled feature rows
//!
//! A [`Regressor`] is an untrained model description; fitting it yields a
//! [`TrainedRegressor`]. The ensemble only talks to these two traits, so a
//! variant that is not compiled in simply does not appear in
//! [`default_variants`].

use crate::config::PredictorConfig;
use crate::error::{ForecastError, Result};
use std::fmt::Debug;
use std::sync::Arc;

/// Trained regressor mapping one scaled feature row to a scaled target
pub trait TrainedRegressor: Debug + Send + Sync {
    /// Short identifier of the variant, e.g. `"rf"`
    fn name(&self) -> &str;

    /// Predict the scaled target for one scaled row
    fn predict(&self, row: &[f64]) -> Result<f64>;

    /// Predict many rows
    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Disagreement between sub-models for `row`, when the variant has any
    fn prediction_spread(&self, _row: &[f64]) -> Option<f64> {
        None
    }

    /// Normalised per-feature importances, when the variant provides them
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Regressor that can be fitted on scaled rows and targets
pub trait Regressor: Debug + Send + Sync {
    /// Short identifier of the variant, e.g. `"rf"`
    fn name(&self) -> &str;

    /// Fit on `rows` (one per sample) and `targets`
    fn fit(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<Box<dyn TrainedRegressor>>;
}

/// Check the shape of a training set, returning its width
pub(crate) fn check_training_set(name: &str, rows: &[Vec<f64>], targets: &[f64]) -> Result<usize> {
    if rows.is_empty() {
        return Err(ForecastError::ModelError(format!("{}: no training rows", name)));
    }
    if rows.len() != targets.len() {
        return Err(ForecastError::ModelError(format!(
            "{}: {} rows but {} targets",
            name,
            rows.len(),
            targets.len()
        )));
    }
    let width = rows[0].len();
    if width == 0 || rows.iter().any(|r| r.len() != width) {
        return Err(ForecastError::ModelError(format!(
            "{}: rows must share a non-zero width",
            name
        )));
    }
    if targets.iter().any(|t| !t.is_finite()) {
        return Err(ForecastError::ModelError(format!(
            "{}: non-finite training target",
            name
        )));
    }
    Ok(width)
}

/// Check that a prediction row matches the fitted width
pub(crate) fn check_row(name: &str, row: &[f64], width: usize) -> Result<()> {
    if row.len() != width {
        return Err(ForecastError::ModelError(format!(
            "{}: expected {} features, got {}",
            name,
            width,
            row.len()
        )));
    }
    Ok(())
}

/// Normalise importances to sum to one; all-zero input stays zero
pub(crate) fn normalize(mut values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter_mut().for_each(|v| *v /= total);
    }
    values
}

/// Variants available in this build
pub fn default_variants(config: &PredictorConfig) -> Vec<Arc<dyn Regressor>> {
    #[allow(unused_mut)]
    let mut variants: Vec<Arc<dyn Regressor>> = vec![
        Arc::new(random_forest::RandomForest::new(config.random_forest.clone())),
        Arc::new(gradient_boosting::GradientBoosting::new(
            config.gradient_boosting.clone(),
        )),
    ];

    #[cfg(feature = "sequence-model")]
    variants.push(Arc::new(sequence::SequenceRegressor::default()));

    variants
}

/// Whether the sequence variant is compiled into this build
pub fn sequence_model_available() -> bool {
    cfg!(feature = "sequence-model")
}

pub mod gradient_boosting;
pub mod random_forest;
#[cfg(feature = "sequence-model")]
pub mod sequence;
pub mod tree;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_variants() {
        let variants = default_variants(&PredictorConfig::default());
        let names: Vec<&str> = variants.iter().map(|v| v.name()).collect();
        assert!(names.contains(&"rf"));
        assert!(names.contains(&"gb"));
        assert_eq!(names.contains(&"seq"), sequence_model_available());
    }

    #[test]
    fn test_check_training_set() {
        assert!(check_training_set("x", &[], &[]).is_err());
        assert!(check_training_set("x", &[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(check_training_set("x", &[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0]).is_err());
        assert_eq!(check_training_set("x", &[vec![1.0, 2.0]], &[3.0]).unwrap(), 2);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(vec![1.0, 3.0]), vec![0.25, 0.75]);
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
