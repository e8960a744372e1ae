//! Predictor configuration
//!
//! Every field has a default, so a configuration file only needs to carry
//! the values it overrides.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Number of features considered at each tree split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of the feature count
    Sqrt,
    /// Every feature
    All,
    /// A fixed number of features
    Fixed(usize),
}

impl MaxFeatures {
    /// Resolve to a concrete count for `n_features` columns
    pub fn resolve(&self, n_features: usize) -> usize {
        let count = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(k) => *k,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// Random forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }
}

/// Gradient boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_split: 10,
            min_samples_leaf: 5,
            subsample: 0.8,
            seed: 42,
        }
    }
}

/// Configuration shared by the trainer, the forecaster and the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Version tag stamped on every forecast point
    pub model_version: String,
    /// Minimum number of observations accepted for training
    pub min_data_points: usize,
    /// Hard cap on the forecast horizon
    pub max_horizon: usize,
    /// Horizon used when a request does not name one
    pub default_horizon: usize,
    /// Number of time-ordered cross-validation folds
    pub cv_folds: usize,
    /// Score recorded for a fold whose fit or scoring fails
    pub fold_fallback_score: f64,
    /// Confidence of a fallback forecast point
    pub fallback_confidence: f64,
    /// Maximum number of contributing factors per point
    pub max_factors: usize,
    /// Number of ranked feature importances reported
    pub top_features: usize,
    /// Clip raw observation columns to their 1st/99th percentiles
    pub clip_percentiles: bool,
    /// Weights used when ensemble re-weighting is disabled
    pub default_weights: BTreeMap<String, f64>,
    pub random_forest: ForestConfig,
    pub gradient_boosting: BoostingConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        let default_weights = [("rf", 0.4), ("gb", 0.3), ("seq", 0.3)]
            .into_iter()
            .map(|(name, weight)| (name.to_string(), weight))
            .collect();

        Self {
            model_version: "2.2".to_string(),
            min_data_points: 48,
            max_horizon: 24,
            default_horizon: 6,
            cv_folds: 3,
            fold_fallback_score: 0.5,
            fallback_confidence: 0.3,
            max_factors: 3,
            top_features: 10,
            clip_percentiles: true,
            default_weights,
            random_forest: ForestConfig::default(),
            gradient_boosting: BoostingConfig::default(),
        }
    }
}

impl PredictorConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: PredictorConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.cv_folds < 2 {
            return Err(ForecastError::InvalidParameter(
                "cv_folds must be at least 2".to_string(),
            ));
        }
        if self.min_data_points < self.cv_folds + 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "min_data_points must be at least {}",
                self.cv_folds + 2
            )));
        }
        if self.max_horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "max_horizon must be positive".to_string(),
            ));
        }
        if self.default_horizon == 0 || self.default_horizon > self.max_horizon {
            return Err(ForecastError::InvalidParameter(format!(
                "default_horizon must be within [1, {}]",
                self.max_horizon
            )));
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return Err(ForecastError::InvalidParameter(
                "fallback_confidence must be within [0, 1]".to_string(),
            ));
        }
        if self.default_weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForecastError::InvalidParameter(
                "default_weights must be finite and non-negative".to_string(),
            ));
        }

        let forest = &self.random_forest;
        if forest.n_estimators == 0 || forest.max_depth == 0 {
            return Err(ForecastError::InvalidParameter(
                "random_forest needs positive n_estimators and max_depth".to_string(),
            ));
        }

        let boosting = &self.gradient_boosting;
        if boosting.n_estimators == 0 || boosting.max_depth == 0 {
            return Err(ForecastError::InvalidParameter(
                "gradient_boosting needs positive n_estimators and max_depth".to_string(),
            ));
        }
        if boosting.learning_rate <= 0.0 || boosting.learning_rate > 1.0 {
            return Err(ForecastError::InvalidParameter(
                "learning_rate must be within (0, 1]".to_string(),
            ));
        }
        if boosting.subsample <= 0.0 || boosting.subsample > 1.0 {
            return Err(ForecastError::InvalidParameter(
                "subsample must be within (0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Clamp a requested horizon to `[1, max_horizon]`
    pub fn clamp_horizon(&self, hours_ahead: usize) -> usize {
        hours_ahead.clamp(1, self.max_horizon)
    }

    /// Horizon for a request: `default_horizon` when none is named, then
    /// clamped like [`clamp_horizon`](Self::clamp_horizon)
    pub fn resolve_horizon(&self, requested: Option<usize>) -> usize {
        self.clamp_horizon(requested.unwrap_or(self.default_horizon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PredictorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_data_points, 48);
        assert_eq!(config.clamp_horizon(100), 24);
        assert_eq!(config.clamp_horizon(0), 1);
    }

    #[test]
    fn test_resolve_horizon_uses_default() {
        let mut config = PredictorConfig::default();
        config.default_horizon = 9;
        assert!(config.validate().is_ok());
        assert_eq!(config.resolve_horizon(None), 9);
        assert_eq!(config.resolve_horizon(Some(3)), 3);
        assert_eq!(config.resolve_horizon(Some(30)), 24);

        config.default_horizon = 25;
        assert!(matches!(
            config.validate(),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(57), 7);
        assert_eq!(MaxFeatures::All.resolve(57), 57);
        assert_eq!(MaxFeatures::Fixed(100).resolve(57), 57);
        assert_eq!(MaxFeatures::Fixed(0).resolve(57), 1);
    }

    #[test]
    fn test_invalid_learning_rate() {
        let mut config = PredictorConfig::default();
        config.gradient_boosting.learning_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_partial_json_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"model_version": "3.0", "random_forest": {{"n_estimators": 20}}}}"#
        )
        .unwrap();

        let config = PredictorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.model_version, "3.0");
        assert_eq!(config.random_forest.n_estimators, 20);
        assert_eq!(config.random_forest.max_depth, 10);
        assert_eq!(config.gradient_boosting.n_estimators, 100);
    }
}
