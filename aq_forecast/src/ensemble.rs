//! Ensemble training: time-ordered cross-validation, score-based weights and
//! the final full-data fit

use crate::config::PredictorConfig;
use crate::data::Observation;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureFallback, FeatureVector};
use crate::models::{default_variants, Regressor, TrainedRegressor};
use crate::scaler::ScalerState;
use aq_math::{r2_score, ErrorMetrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{info, warn};

/// Scaled prediction used when no regressor produced a value
pub const NEUTRAL_SCALED_PREDICTION: f64 = 0.5;

/// Normalised variant weights; sums to one whenever a variant is active
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnsembleWeights(BTreeMap<String, f64>);

impl EnsembleWeights {
    /// Weights proportional to the non-negative part of each score.
    ///
    /// When every score is zero (or negative) the weight is split equally.
    pub fn from_scores(scores: &BTreeMap<String, f64>) -> Self {
        let clamped: BTreeMap<String, f64> = scores
            .iter()
            .map(|(name, s)| (name.clone(), if s.is_finite() { s.max(0.0) } else { 0.0 }))
            .collect();
        Self::normalized(clamped)
    }

    /// Configured default weights restricted to `active` variants
    pub fn from_defaults(defaults: &BTreeMap<String, f64>, active: &[&str]) -> Self {
        let restricted = active
            .iter()
            .map(|name| {
                let w = defaults.get(*name).copied().unwrap_or(0.0);
                (name.to_string(), if w.is_finite() { w.max(0.0) } else { 0.0 })
            })
            .collect();
        Self::normalized(restricted)
    }

    fn normalized(mut weights: BTreeMap<String, f64>) -> Self {
        let total: f64 = weights.values().sum();
        let n = weights.len();
        if total > 0.0 {
            weights.values_mut().for_each(|w| *w /= total);
        } else if n > 0 {
            weights.values_mut().for_each(|w| *w = 1.0 / n as f64);
        }
        Self(weights)
    }

    /// Weight of a variant; 0 when it is not part of the ensemble
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Expanding-window time-ordered splits.
///
/// Each fold trains on everything before its validation block; the
/// validation blocks are contiguous, equally sized and end at `n`.
pub fn time_series_split(n: usize, folds: usize) -> Result<Vec<(Range<usize>, Range<usize>)>> {
    if folds < 2 {
        return Err(ForecastError::InvalidParameter(format!(
            "Need at least 2 folds, got {}",
            folds
        )));
    }
    if folds + 1 > n {
        return Err(ForecastError::ValidationError(format!(
            "Cannot split {} samples into {} folds",
            n, folds
        )));
    }

    let test_size = n / (folds + 1);
    let first = n - folds * test_size;
    Ok((0..folds)
        .map(|k| {
            let start = first + k * test_size;
            (0..start, start..start + test_size)
        })
        .collect())
}

/// Importance of one feature in the primary tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Summary of one training call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub mae: f64,
    pub rmse: f64,
    pub r2_score: f64,
    pub training_samples: usize,
    pub ensemble_weights: EnsembleWeights,
    pub top_features: Vec<FeatureImportance>,
    /// Mean cross-validation R² per variant
    pub model_scores: BTreeMap<String, f64>,
    pub feature_fallbacks: Vec<FeatureFallback>,
}

/// Combined prediction for one scaled row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsemblePrediction {
    /// Weighted scaled prediction
    pub value: f64,
    /// Weighted spread among the sub-models of the contributing variants
    pub spread: Option<f64>,
    /// Number of weighted variants that produced a finite prediction
    pub contributors: usize,
}

/// Immutable result of [`EnsembleTrainer::fit`]
#[derive(Debug)]
pub struct TrainedEnsemble {
    feature_names: Arc<Vec<String>>,
    scaler: ScalerState,
    members: Vec<Box<dyn TrainedRegressor>>,
    weights: EnsembleWeights,
    report: TrainingReport,
}

impl TrainedEnsemble {
    pub fn feature_names(&self) -> &Arc<Vec<String>> {
        &self.feature_names
    }

    pub fn scaler(&self) -> &ScalerState {
        &self.scaler
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Names of the fitted variants
    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name().to_string()).collect()
    }

    /// Scale a feature row; non-finite scaled values become 0
    pub fn scale_row(&self, row: &FeatureVector) -> Result<Vec<f64>> {
        if row.names() != self.feature_names.as_slice() {
            return Err(ForecastError::ForecastStepError(
                "Feature row does not match the trained feature set".to_string(),
            ));
        }
        let mut scaled = self.scaler.features.transform_row(row.values())?;
        let repaired = zero_non_finite(&mut scaled);
        if repaired > 0 {
            warn!(repaired, "non-finite scaled features zeroed");
        }
        Ok(scaled)
    }

    /// Weighted prediction over the variants that succeed for `scaled`.
    ///
    /// Weights are renormalised over the successful variants. With no
    /// successful variant the value is [`NEUTRAL_SCALED_PREDICTION`]. The
    /// spread is the weighted mean over successful variants that report one.
    pub fn predict_scaled(&self, scaled: &[f64]) -> EnsemblePrediction {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        let mut contributors = 0;
        let mut spread_sum = 0.0;
        let mut spread_weight = 0.0;

        for member in &self.members {
            let weight = self.weights.get(member.name());
            if weight <= 0.0 {
                continue;
            }
            match member.predict(scaled) {
                Ok(p) if p.is_finite() => {
                    weighted += weight * p;
                    weight_sum += weight;
                    contributors += 1;
                    if let Some(s) = member.prediction_spread(scaled).filter(|s| s.is_finite()) {
                        spread_sum += weight * s;
                        spread_weight += weight;
                    }
                }
                Ok(_) => warn!(variant = member.name(), "non-finite prediction ignored"),
                Err(e) => warn!(variant = member.name(), error = %e, "prediction failed"),
            }
        }

        let value = if contributors > 0 && weight_sum > 0.0 {
            weighted / weight_sum
        } else {
            NEUTRAL_SCALED_PREDICTION
        };
        let spread = (spread_weight > 0.0).then(|| spread_sum / spread_weight);

        EnsemblePrediction {
            value,
            spread,
            contributors,
        }
    }

    /// Scaled target back to µg/m³
    pub fn inverse_target(&self, scaled: f64) -> f64 {
        self.scaler.target.inverse(scaled)
    }
}

fn zero_non_finite(values: &mut [f64]) -> usize {
    let mut repaired = 0;
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = 0.0;
        repaired += 1;
    }
    repaired
}

/// Trains every configured regressor variant and combines them
#[derive(Debug, Clone)]
pub struct EnsembleTrainer {
    config: PredictorConfig,
    variants: Vec<Arc<dyn Regressor>>,
    builder: FeatureBuilder,
}

impl EnsembleTrainer {
    /// Create a trainer over the variants compiled into this build
    pub fn new(config: PredictorConfig) -> Self {
        let variants = default_variants(&config);
        Self::with_variants(config, variants)
    }

    /// Create a trainer over an explicit set of variants
    pub fn with_variants(config: PredictorConfig, variants: Vec<Arc<dyn Regressor>>) -> Self {
        Self {
            config,
            variants,
            builder: FeatureBuilder::new(),
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Names of the variants this trainer fits
    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name().to_string()).collect()
    }

    /// Train on clean, time-ordered observations.
    ///
    /// Row `i` of the feature table is paired with `pm25[i + 1]`; the last
    /// observation has no target.
    pub fn fit(&self, observations: &[Observation], use_ensemble: bool) -> Result<TrainedEnsemble> {
        let min = self.config.min_data_points.max(2);
        if observations.len() < min {
            return Err(ForecastError::ValidationError(format!(
                "At least {} observations required, got {}",
                min,
                observations.len()
            )));
        }
        if self.variants.is_empty() {
            return Err(ForecastError::FinalFitError(
                "No regressor variants configured".to_string(),
            ));
        }

        info!(observations = observations.len(), "training ensemble");

        let prepared = self.builder.build(observations)?;
        let frame = prepared.frame;
        let n_train = frame.len() - 1;
        let rows = frame.rows(0..n_train);
        let targets: Vec<f64> = observations[1..].iter().map(|o| o.pm25).collect();

        let scaler = ScalerState::fit(&rows, &targets)
            .map_err(|e| ForecastError::FeaturePreparationError(format!("Scaling failed: {}", e)))?;
        let mut scaled_rows = scaler.features.transform(&rows)?;
        let mut scaled_targets: Vec<f64> = targets.iter().map(|t| scaler.target.transform(*t)).collect();

        let repaired = scaled_rows.iter_mut().map(|r| zero_non_finite(r)).sum::<usize>()
            + zero_non_finite(&mut scaled_targets);
        if repaired > 0 {
            warn!(repaired, "non-finite values zeroed after scaling");
        }

        let model_scores = self.cross_validate(&scaled_rows, &scaled_targets);

        let mut members = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            let fitted = variant.fit(&scaled_rows, &scaled_targets).map_err(|e| {
                ForecastError::FinalFitError(format!("{} failed on the full dataset: {}", variant.name(), e))
            })?;
            members.push(fitted);
        }

        let names = self.variant_names();
        let weights = if use_ensemble {
            EnsembleWeights::from_scores(&model_scores)
        } else {
            let active: Vec<&str> = names.iter().map(String::as_str).collect();
            EnsembleWeights::from_defaults(&self.config.default_weights, &active)
        };

        let mut ensemble = TrainedEnsemble {
            feature_names: Arc::clone(frame.names()),
            scaler,
            members,
            weights,
            report: TrainingReport {
                mae: 0.0,
                rmse: 0.0,
                r2_score: 0.0,
                training_samples: n_train,
                ensemble_weights: EnsembleWeights::default(),
                top_features: Vec::new(),
                model_scores,
                feature_fallbacks: prepared.report.fallbacks,
            },
        };

        let predictions: Vec<f64> = scaled_rows
            .iter()
            .map(|row| ensemble.inverse_target(ensemble.predict_scaled(row).value))
            .collect();
        let metrics = ErrorMetrics::compute(&targets, &predictions).unwrap_or_else(|e| {
            warn!(error = %e, "in-sample evaluation failed");
            ErrorMetrics {
                mae: 1.0,
                rmse: 1.0,
                r2_score: 0.5,
            }
        });

        ensemble.report.mae = metrics.mae;
        ensemble.report.rmse = metrics.rmse;
        ensemble.report.r2_score = metrics.r2_score;
        ensemble.report.ensemble_weights = ensemble.weights.clone();
        ensemble.report.top_features = top_features(&ensemble, self.config.top_features);

        info!(
            mae = metrics.mae,
            rmse = metrics.rmse,
            r2 = metrics.r2_score,
            weights = ?ensemble.weights.as_map(),
            "ensemble trained"
        );

        Ok(ensemble)
    }

    /// Mean validation R² per variant; failed folds score the fallback value
    fn cross_validate(&self, rows: &[Vec<f64>], targets: &[f64]) -> BTreeMap<String, f64> {
        let fallback = self.config.fold_fallback_score;
        let splits = match time_series_split(rows.len(), self.config.cv_folds) {
            Ok(splits) => splits,
            Err(e) => {
                warn!(error = %e, "cross-validation skipped");
                return self
                    .variants
                    .iter()
                    .map(|v| (v.name().to_string(), fallback))
                    .collect();
            }
        };

        let mut scores = BTreeMap::new();
        for variant in &self.variants {
            let mut fold_scores = Vec::with_capacity(splits.len());
            for (fold, (train, valid)) in splits.iter().enumerate() {
                let score = score_fold(variant.as_ref(), rows, targets, train.clone(), valid.clone())
                    .unwrap_or_else(|e| {
                        let e = ForecastError::TrainingFoldError(format!("fold {}: {}", fold, e));
                        warn!(variant = variant.name(), error = %e, "fold scored with fallback");
                        fallback
                    });
                fold_scores.push(score);
            }
            let mean = fold_scores.iter().sum::<f64>() / fold_scores.len().max(1) as f64;
            scores.insert(variant.name().to_string(), mean);
        }
        scores
    }
}

fn score_fold(
    variant: &dyn Regressor,
    rows: &[Vec<f64>],
    targets: &[f64],
    train: Range<usize>,
    valid: Range<usize>,
) -> Result<f64> {
    let model = variant.fit(&rows[train.clone()], &targets[train])?;
    let predictions = model.predict_batch(&rows[valid.clone()])?;
    let score = r2_score(&targets[valid], &predictions)?;
    if score.is_finite() {
        Ok(score)
    } else {
        Err(ForecastError::ModelError("non-finite validation score".to_string()))
    }
}

/// Highest-ranked features of the "rf" variant, or of the first variant
/// that reports importances
fn top_features(ensemble: &TrainedEnsemble, limit: usize) -> Vec<FeatureImportance> {
    let importances = ensemble
        .members
        .iter()
        .find(|m| m.name() == "rf")
        .and_then(|m| m.feature_importances())
        .or_else(|| ensemble.members.iter().find_map(|m| m.feature_importances()));

    let Some(importances) = importances else {
        return Vec::new();
    };

    let mut ranked: Vec<FeatureImportance> = ensemble
        .feature_names
        .iter()
        .zip(importances)
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked.truncate(limit);
    ranked
}
