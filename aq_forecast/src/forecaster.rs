//! Multi-step recursive forecasting
//!
//! Each step predicts the next hour's PM2.5 from the current feature row and
//! then synthesises the row for the following step from that prediction.
//! A failed step yields a fallback point and the forecast continues, so the
//! output always has the requested length.

use crate::aqi::pm25_to_aqi;
use crate::config::PredictorConfig;
use crate::data::Observation;
use crate::ensemble::TrainedEnsemble;
use crate::error::{ForecastError, Result};
use crate::factors::{contributing_factors, ContributingFactor};
use crate::features::{FeatureBuilder, FeatureVector};
use crate::utils::{hours_after, round_to};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Windows of the rolling means refreshed on synthetic rows
const REFRESHED_MEAN_WINDOWS: [usize; 2] = [3, 6];

/// One forecast step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub hour_ahead: usize,
    pub predicted_pm25: f64,
    pub predicted_aqi: f64,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub contributing_factors: Vec<ContributingFactor>,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

impl ForecastPoint {
    /// Whether this point came from the fallback path
    pub fn is_fallback(&self) -> bool {
        self.model_version.ends_with("-fallback")
    }
}

/// Confidence used when no spread estimate is available
pub fn horizon_confidence(hour_ahead: usize) -> f64 {
    (0.7 - 0.05 * (hour_ahead as f64 - 1.0)).clamp(0.3, 0.9)
}

/// Confidence from the spread of sub-model predictions
pub fn spread_confidence(spread: f64) -> f64 {
    (1.0 / (1.0 + spread.abs())).clamp(0.1, 0.95)
}

struct StepOutcome {
    pm25: f64,
    aqi: f64,
    confidence: f64,
    factors: Vec<ContributingFactor>,
}

/// Runs the recursive forecast against a trained ensemble
#[derive(Debug, Clone)]
pub struct RecursiveForecaster {
    max_horizon: usize,
    max_factors: usize,
    fallback_confidence: f64,
    model_version: String,
    builder: FeatureBuilder,
}

impl RecursiveForecaster {
    /// Create a forecaster
    pub fn new(config: &PredictorConfig) -> Self {
        Self {
            max_horizon: config.max_horizon,
            max_factors: config.max_factors,
            fallback_confidence: config.fallback_confidence,
            model_version: config.model_version.clone(),
            builder: FeatureBuilder::new(),
        }
    }

    /// Forecast `hours_ahead` hourly steps (clamped to the configured
    /// horizon) after the last observation.
    ///
    /// Fallback points repeat the last observation's sanitized PM2.5; use
    /// [`forecast_with_last_reading`](Self::forecast_with_last_reading) to
    /// fall back to the raw sensor value instead.
    pub fn forecast(
        &self,
        ensemble: &TrainedEnsemble,
        observations: &[Observation],
        hours_ahead: usize,
    ) -> Result<Vec<ForecastPoint>> {
        self.run(ensemble, observations, hours_ahead, None)
    }

    /// Like [`forecast`](Self::forecast), with fallback points repeating
    /// `last_reading`, the unclipped PM2.5 of the latest record
    pub fn forecast_with_last_reading(
        &self,
        ensemble: &TrainedEnsemble,
        observations: &[Observation],
        hours_ahead: usize,
        last_reading: f64,
    ) -> Result<Vec<ForecastPoint>> {
        self.run(ensemble, observations, hours_ahead, Some(last_reading))
    }

    fn run(
        &self,
        ensemble: &TrainedEnsemble,
        observations: &[Observation],
        hours_ahead: usize,
        last_reading: Option<f64>,
    ) -> Result<Vec<ForecastPoint>> {
        let last = observations.last().ok_or_else(|| {
            ForecastError::ValidationError("Cannot forecast from zero observations".to_string())
        })?;
        let fallback_pm25 = last_reading.unwrap_or(last.pm25);

        let frame = self.builder.build(observations)?.frame;
        if frame.names() != ensemble.feature_names() {
            return Err(ForecastError::FeaturePreparationError(
                "Features do not match the trained ensemble".to_string(),
            ));
        }
        let mut current = frame.last().ok_or_else(|| {
            ForecastError::FeaturePreparationError("Empty feature table".to_string())
        })?;
        let mut history: Vec<f64> = frame.column("pm25").map(<[f64]>::to_vec).unwrap_or_default();

        let horizon = hours_ahead.clamp(1, self.max_horizon.max(1));
        let mut points = Vec::with_capacity(horizon);

        for hour_ahead in 1..=horizon {
            let timestamp = hours_after(last.timestamp, hour_ahead);

            match self.step(ensemble, &current, hour_ahead) {
                Ok(outcome) => {
                    debug!(
                        hour_ahead,
                        pm25 = outcome.pm25,
                        confidence = outcome.confidence,
                        "forecast step"
                    );
                    points.push(ForecastPoint {
                        hour_ahead,
                        predicted_pm25: round_to(outcome.pm25, 2),
                        predicted_aqi: round_to(outcome.aqi, 1),
                        confidence: round_to(outcome.confidence, 3),
                        timestamp,
                        contributing_factors: outcome.factors,
                        model_version: self.model_version.clone(),
                    });
                    current = synthesize_next(&current, outcome.pm25, outcome.aqi, &history);
                    history.push(outcome.pm25);
                }
                Err(e) => {
                    warn!(hour_ahead, error = %e, "forecast step fell back to last observation");
                    points.push(self.fallback_point(hour_ahead, fallback_pm25, timestamp));
                }
            }
        }

        Ok(points)
    }

    fn step(&self, ensemble: &TrainedEnsemble, current: &FeatureVector, hour_ahead: usize) -> Result<StepOutcome> {
        let scaled = ensemble.scale_row(current)?;
        let prediction = ensemble.predict_scaled(&scaled);
        if prediction.contributors == 0 {
            return Err(ForecastError::ForecastStepError(
                "No regressor produced a prediction".to_string(),
            ));
        }

        let pm25 = ensemble.inverse_target(prediction.value);
        if !pm25.is_finite() {
            return Err(ForecastError::ForecastStepError(
                "Non-finite PM2.5 prediction".to_string(),
            ));
        }
        let pm25 = pm25.clamp(0.0, 1000.0);

        let confidence = prediction
            .spread
            .map(spread_confidence)
            .unwrap_or_else(|| horizon_confidence(hour_ahead));

        Ok(StepOutcome {
            pm25,
            aqi: pm25_to_aqi(pm25),
            confidence,
            factors: contributing_factors(current, pm25, self.max_factors),
        })
    }

    fn fallback_point(&self, hour_ahead: usize, last_pm25: f64, timestamp: DateTime<Utc>) -> ForecastPoint {
        let pm25 = if last_pm25.is_finite() {
            last_pm25.clamp(0.0, 1000.0)
        } else {
            0.0
        };
        ForecastPoint {
            hour_ahead,
            predicted_pm25: round_to(pm25, 2),
            predicted_aqi: round_to(pm25_to_aqi(pm25), 1),
            confidence: self.fallback_confidence,
            timestamp,
            contributing_factors: Vec::new(),
            model_version: format!("{}-fallback", self.model_version),
        }
    }
}

/// Next feature row: the prediction replaces pm25/aqi, the clock advances
/// one hour and the short rolling means are refreshed; every other feature
/// is carried forward unchanged.
fn synthesize_next(current: &FeatureVector, pm25: f64, aqi: f64, history: &[f64]) -> FeatureVector {
    let mut next = current.clone();
    next.set("pm25", pm25);
    next.set("aqi", aqi);

    if let Some(hour) = current.get("hour") {
        let hour = (hour + 1.0).rem_euclid(24.0);
        next.set("hour", hour);
        if hour == 0.0 {
            if let Some(day) = current.get("dayOfWeek") {
                next.set("dayOfWeek", (day + 1.0).rem_euclid(7.0));
            }
        }
    }

    for window in REFRESHED_MEAN_WINDOWS {
        let tail = &history[history.len().saturating_sub(window - 1)..];
        let mean = (tail.iter().sum::<f64>() + pm25) / (tail.len() + 1) as f64;
        next.set(&format!("pm25_ma_{}", window), mean);
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[case(1, 0.7)]
    #[case(2, 0.65)]
    #[case(5, 0.5)]
    #[case(9, 0.3)]
    #[case(24, 0.3)]
    fn test_horizon_confidence(#[case] hour: usize, #[case] expected: f64) {
        assert_relative_eq!(horizon_confidence(hour), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_spread_confidence_bounds() {
        assert_eq!(spread_confidence(0.0), 0.95);
        assert_relative_eq!(spread_confidence(1.0), 0.5);
        assert_eq!(spread_confidence(100.0), 0.1);
    }

    fn row(pairs: &[(&str, f64)]) -> FeatureVector {
        let names = Arc::new(pairs.iter().map(|(n, _)| n.to_string()).collect::<Vec<_>>());
        FeatureVector::new(names, pairs.iter().map(|(_, v)| *v).collect()).unwrap()
    }

    #[test]
    fn test_synthesize_wraps_clock() {
        let current = row(&[
            ("pm25", 10.0),
            ("aqi", 40.0),
            ("hour", 23.0),
            ("dayOfWeek", 6.0),
            ("pm25_ma_3", 0.0),
            ("pm25_ma_6", 0.0),
            ("temperature", 21.0),
        ]);
        let next = synthesize_next(&current, 16.0, 59.0, &[4.0, 6.0, 8.0, 10.0]);

        assert_eq!(next.get("pm25"), Some(16.0));
        assert_eq!(next.get("aqi"), Some(59.0));
        assert_eq!(next.get("hour"), Some(0.0));
        assert_eq!(next.get("dayOfWeek"), Some(0.0));
        assert_relative_eq!(next.get("pm25_ma_3").unwrap(), (8.0 + 10.0 + 16.0) / 3.0);
        assert_relative_eq!(next.get("pm25_ma_6").unwrap(), (4.0 + 6.0 + 8.0 + 10.0 + 16.0) / 5.0);
        assert_eq!(next.get("temperature"), Some(21.0));
    }

    #[test]
    fn test_synthesize_keeps_day_mid_day() {
        let current = row(&[("pm25", 1.0), ("aqi", 1.0), ("hour", 10.0), ("dayOfWeek", 3.0)]);
        let next = synthesize_next(&current, 2.0, 8.0, &[1.0]);
        assert_eq!(next.get("hour"), Some(11.0));
        assert_eq!(next.get("dayOfWeek"), Some(3.0));
    }

    #[test]
    fn test_point_serialization_keys() {
        let point = ForecastPoint {
            hour_ahead: 1,
            predicted_pm25: 12.0,
            predicted_aqi: 50.0,
            confidence: 0.7,
            timestamp: Utc::now(),
            contributing_factors: Vec::new(),
            model_version: "2.2".to_string(),
        };
        let json = serde_json::to_value(&point).unwrap();
        assert!(json.get("modelVersion").is_some());
        assert!(json.get("hour_ahead").is_some());
        assert!(!point.is_fallback());
    }
}
