//! Summary statistics over a forecast

use crate::forecaster::ForecastPoint;
use aq_math::{mean, median, population_std};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the forecast from first to last step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Aggregate statistics of the predicted PM2.5 values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastStatistics {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub trend: Trend,
    pub mean_confidence: f64,
}

impl ForecastStatistics {
    /// Summarise a forecast; `None` for an empty forecast
    pub fn from_points(points: &[ForecastPoint]) -> Option<Self> {
        let values: Vec<f64> = points.iter().map(|p| p.predicted_pm25).collect();
        let confidences: Vec<f64> = points.iter().map(|p| p.confidence).collect();

        let first = *values.first()?;
        let last = *values.last()?;
        let trend = if values.len() > 1 && last > first {
            Trend::Increasing
        } else {
            Trend::Stable
        };

        Some(Self {
            mean: mean(&values)?,
            median: median(&values)?,
            std: population_std(&values)?,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            trend,
            mean_confidence: mean(&confidences)?,
        })
    }
}

impl fmt::Display for ForecastStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {:.2}, median {:.2}, std {:.2}, range [{:.2}, {:.2}], trend {}, confidence {:.3}",
            self.mean, self.median, self.std, self.min, self.max, self.trend, self.mean_confidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn point(hour_ahead: usize, pm25: f64, confidence: f64) -> ForecastPoint {
        ForecastPoint {
            hour_ahead,
            predicted_pm25: pm25,
            predicted_aqi: 0.0,
            confidence,
            timestamp: Utc::now(),
            contributing_factors: Vec::new(),
            model_version: "test".to_string(),
        }
    }

    #[test]
    fn test_statistics() {
        let points = vec![point(1, 10.0, 0.7), point(2, 20.0, 0.6), point(3, 30.0, 0.5)];
        let stats = ForecastStatistics::from_points(&points).unwrap();

        assert_relative_eq!(stats.mean, 20.0);
        assert_relative_eq!(stats.median, 20.0);
        assert_relative_eq!(stats.std, (200.0f64 / 3.0).sqrt());
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.trend, Trend::Increasing);
        assert_relative_eq!(stats.mean_confidence, 0.6);
    }

    #[test]
    fn test_flat_or_falling_is_stable() {
        let falling = vec![point(1, 30.0, 0.5), point(2, 10.0, 0.5)];
        assert_eq!(ForecastStatistics::from_points(&falling).unwrap().trend, Trend::Stable);

        let single = vec![point(1, 30.0, 0.5)];
        let stats = ForecastStatistics::from_points(&single).unwrap();
        assert_eq!(stats.trend, Trend::Stable);
        assert_eq!(stats.std, 0.0);
    }

    #[test]
    fn test_empty() {
        assert!(ForecastStatistics::from_points(&[]).is_none());
    }
}
