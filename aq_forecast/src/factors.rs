//! Rule-based explanation of a forecast step

use crate::features::FeatureVector;
use crate::utils::round_to;
use serde::{Deserialize, Serialize};

/// Strength of a contributing factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
}

/// One reason the forecast looks the way it does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub factor: String,
    pub impact: Impact,
    pub value: String,
}

impl ContributingFactor {
    fn new(factor: &str, impact: Impact, value: String) -> Self {
        Self {
            factor: factor.to_string(),
            impact,
            value,
        }
    }
}

fn finite(features: &FeatureVector, name: &str) -> Option<f64> {
    features.get(name).filter(|v| v.is_finite())
}

/// Evaluate the factor rules in priority order, keeping at most `limit`.
///
/// `features` is the row the prediction was made from and `predicted_pm25`
/// the prediction in µg/m³.
pub fn contributing_factors(
    features: &FeatureVector,
    predicted_pm25: f64,
    limit: usize,
) -> Vec<ContributingFactor> {
    let mut factors = Vec::new();

    if let Some(trend) = finite(features, "pm25_ma_24") {
        if trend > 0.0 && predicted_pm25 > trend * 1.1 {
            let pct = round_to((predicted_pm25 / trend - 1.0) * 100.0, 1);
            factors.push(ContributingFactor::new(
                "Rising trend",
                Impact::High,
                format!("+{:.1}%", pct),
            ));
        }
    }

    if finite(features, "is_morning_rush") == Some(1.0) {
        factors.push(ContributingFactor::new(
            "Morning rush hour",
            Impact::Medium,
            "Active".to_string(),
        ));
    }

    if let Some(temperature) = finite(features, "temperature").filter(|t| *t > 30.0) {
        factors.push(ContributingFactor::new(
            "High temperature",
            Impact::Medium,
            format!("{:.1}°C", temperature),
        ));
    }

    if let Some(humidity) = finite(features, "humidity").filter(|h| *h < 30.0) {
        factors.push(ContributingFactor::new(
            "Dry air",
            Impact::Medium,
            format!("{:.1}%", humidity),
        ));
    }

    if finite(features, "is_dry_season") == Some(1.0) {
        factors.push(ContributingFactor::new(
            "Dry season",
            Impact::High,
            "Active".to_string(),
        ));
    }

    factors.truncate(limit);
    factors
}
