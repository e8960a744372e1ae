//! Feature engineering over time-ordered observations
//!
//! Every derived column at row `i` is computed from rows `0..=i` only, with
//! two deliberate exceptions inherited from the production model: the pm25
//! z-score and the lag mean-fill use whole-window statistics.
//!
//! Each feature is produced as a [`FeatureOutcome`]. A feature that cannot be
//! computed falls back to a raw column (or a neutral constant) and the reason
//! is collected in the [`FeatureReport`] instead of aborting the pipeline.

use crate::data::{observation_table, ColumnTable, Observation, OBSERVATION_COLUMNS};
use crate::error::{ForecastError, Result};
use crate::sanitize::Sanitizer;
use crate::utils::safe_divide;
use aq_math::rolling::{diff, lag_backfilled, pct_change, rolling_mean, rolling_quantile, rolling_std};
use aq_math::{mean, sample_std, MathError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, warn};

/// Windows of the pm25/pm10 rolling means
pub const MEAN_WINDOWS: [usize; 4] = [3, 6, 12, 24];
/// Windows of the pm25 rolling standard deviation
pub const STD_WINDOWS: [usize; 2] = [6, 24];
/// Lags of the pm25 difference and percent-change features
pub const CHANGE_LAGS: [usize; 3] = [1, 6, 24];
/// Lags of the shifted pm25/aqi features
pub const SHIFT_LAGS: [usize; 4] = [1, 6, 12, 24];
/// Window of the rolling pm25 quartiles
pub const QUANTILE_WINDOW: usize = 24;

/// Result of computing one feature column
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    /// Computed from the input window
    Computed(Vec<f64>),
    /// Replaced (fully or partly) by fallback values
    Fallback { values: Vec<f64>, reason: String },
}

impl FeatureOutcome {
    /// Column values regardless of how they were obtained
    pub fn into_values(self) -> Vec<f64> {
        match self {
            FeatureOutcome::Computed(values) => values,
            FeatureOutcome::Fallback { values, .. } => values,
        }
    }
}

/// A feature that did not compute cleanly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFallback {
    pub feature: String,
    pub reason: String,
}

/// Aggregated feature-preparation outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureReport {
    /// Number of feature columns produced
    pub feature_count: usize,
    /// Features that fell back, with the reason
    pub fallbacks: Vec<FeatureFallback>,
    /// Values repaired by the final finiteness pass
    pub repaired_values: usize,
}

impl FeatureReport {
    /// Whether every feature computed without fallback
    pub fn is_clean(&self) -> bool {
        self.fallbacks.is_empty() && self.repaired_values == 0
    }
}

/// One row of the feature table, addressable by feature name
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<Vec<String>>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Create a vector; `values` must match `names` in length
    pub fn new(names: Arc<Vec<String>>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(ForecastError::FeaturePreparationError(format!(
                "Feature vector has {} values for {} names",
                values.len(),
                names.len()
            )));
        }
        Ok(Self { names, values })
    }

    /// Value of a named feature
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    /// Overwrite a named feature; returns false when the name is unknown
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match self.names.iter().position(|n| n == name) {
            Some(idx) => {
                self.values[idx] = value;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `(name, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Feature table: one row per observation
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    names: Arc<Vec<String>>,
    columns: Vec<Vec<f64>>,
}

impl FeatureFrame {
    fn from_table(table: ColumnTable) -> Self {
        Self {
            names: Arc::new(table.names().to_vec()),
            columns: table.columns().to_vec(),
        }
    }

    /// Shared feature names
    pub fn names(&self) -> &Arc<Vec<String>> {
        &self.names
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of feature columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Values of a named feature column
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Row `index` as a named vector
    pub fn row(&self, index: usize) -> Option<FeatureVector> {
        if index >= self.len() {
            return None;
        }
        Some(FeatureVector {
            names: Arc::clone(&self.names),
            values: self.columns.iter().map(|c| c[index]).collect(),
        })
    }

    /// Last row, the seed of a forecast
    pub fn last(&self) -> Option<FeatureVector> {
        self.len().checked_sub(1).and_then(|idx| self.row(idx))
    }

    /// Dense rows `range.start..range.end`, for model input
    pub fn rows(&self, range: std::ops::Range<usize>) -> Vec<Vec<f64>> {
        range
            .filter(|&i| i < self.len())
            .map(|i| self.columns.iter().map(|c| c[i]).collect())
            .collect()
    }

    /// Whether every value is finite
    pub fn all_finite(&self) -> bool {
        self.columns.iter().flatten().all(|v| v.is_finite())
    }
}

/// Features plus the report of how they were obtained
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub frame: FeatureFrame,
    pub report: FeatureReport,
}

/// Accumulates feature columns and their outcomes
struct FrameAccumulator {
    table: ColumnTable,
    report: FeatureReport,
}

impl FrameAccumulator {
    fn new() -> Self {
        Self {
            table: ColumnTable::new(),
            report: FeatureReport::default(),
        }
    }

    fn push(&mut self, name: &str, outcome: FeatureOutcome) {
        if let FeatureOutcome::Fallback { reason, .. } = &outcome {
            warn!(feature = name, reason = %reason, "feature fell back");
            self.report.fallbacks.push(FeatureFallback {
                feature: name.to_string(),
                reason: reason.clone(),
            });
        }
        self.table.insert(name, outcome.into_values());
    }

    fn computed(&mut self, name: &str, values: Vec<f64>) {
        self.push(name, FeatureOutcome::Computed(values));
    }

    /// Keep finite computed values, substituting `fallback[i]` elsewhere
    fn guarded(
        &mut self,
        name: &str,
        computed: std::result::Result<Vec<f64>, MathError>,
        fallback: &[f64],
    ) {
        self.push(name, guard(computed, fallback));
    }

    /// Undefined entries (first rows, zero bases) are defined as 0
    fn zero_filled(&mut self, name: &str, computed: std::result::Result<Vec<f64>, MathError>, len: usize) {
        let outcome = match computed {
            Ok(values) => FeatureOutcome::Computed(
                values
                    .into_iter()
                    .map(|v| if v.is_finite() { v } else { 0.0 })
                    .collect(),
            ),
            Err(e) => FeatureOutcome::Fallback {
                values: vec![0.0; len],
                reason: e.to_string(),
            },
        };
        self.push(name, outcome);
    }
}

fn guard(computed: std::result::Result<Vec<f64>, MathError>, fallback: &[f64]) -> FeatureOutcome {
    match computed {
        Ok(values) => {
            let bad = values.iter().filter(|v| !v.is_finite()).count();
            if bad == 0 {
                FeatureOutcome::Computed(values)
            } else {
                let values = values
                    .iter()
                    .zip(fallback.iter())
                    .map(|(&v, &f)| if v.is_finite() { v } else { f })
                    .collect();
                FeatureOutcome::Fallback {
                    values,
                    reason: format!("{} non-finite values replaced", bad),
                }
            }
        }
        Err(e) => FeatureOutcome::Fallback {
            values: fallback.to_vec(),
            reason: e.to_string(),
        },
    }
}

fn indicator<F: Fn(f64) -> bool>(values: &[f64], predicate: F) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if predicate(v) { 1.0 } else { 0.0 })
        .collect()
}

fn cyclical(values: &[f64], period: f64) -> (Vec<f64>, Vec<f64>) {
    values
        .iter()
        .map(|&v| {
            let angle = 2.0 * PI * v / period;
            (angle.sin(), angle.cos())
        })
        .unzip()
}

/// Heat index from temperature (°C) and relative humidity (%).
///
/// The polynomial only applies from 27°C upward; below that the heat index
/// is the temperature itself.
pub fn heat_index(temperature: f64, humidity: f64) -> f64 {
    let t = temperature.clamp(-50.0, 60.0);
    let h = humidity.clamp(0.0, 100.0);
    if t < 27.0 {
        return t;
    }

    let hi = -8.78469 + 1.61139 * t + 2.33854 * h
        - 0.14611 * t * h
        - 0.01230 * t.powi(2)
        - 0.01642 * h.powi(2)
        + 0.00221 * t.powi(2) * h
        + 0.00072 * t * h.powi(2);

    if hi.is_finite() {
        hi
    } else {
        t
    }
}

/// Converts observations into model features
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    sanitizer: Sanitizer,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureBuilder {
    /// Create a feature builder
    pub fn new() -> Self {
        Self {
            sanitizer: Sanitizer::finite_only(),
        }
    }

    /// Build features from clean, time-ordered observations
    pub fn build(&self, observations: &[Observation]) -> Result<PreparedFeatures> {
        self.build_from_table(&observation_table(observations))
    }

    /// Build features from a table holding the base observation columns
    pub fn build_from_table(&self, base: &ColumnTable) -> Result<PreparedFeatures> {
        if base.is_empty() {
            return Err(ForecastError::FeaturePreparationError(
                "No observations to build features from".to_string(),
            ));
        }

        let missing: Vec<&str> = OBSERVATION_COLUMNS
            .iter()
            .copied()
            .filter(|c| base.column(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::FeaturePreparationError(format!(
                "Missing base columns: {:?}",
                missing
            )));
        }

        let mut base = base.clone();
        self.sanitizer.clean(&mut base);

        let col = |name: &str| base.column(name).map(<[f64]>::to_vec).unwrap_or_default();
        let n = base.len();
        let pm25 = col("pm25");
        let pm10 = col("pm10");
        let co2 = col("co2");
        let temperature = col("temperature");
        let humidity = col("humidity");
        let hour = col("hour");
        let day = col("dayOfWeek");
        let month = col("month");
        let aqi = col("aqi");

        let mut acc = FrameAccumulator::new();

        for name in OBSERVATION_COLUMNS {
            acc.computed(name, col(name));
        }

        // Cyclical time encodings
        for (prefix, values, period) in [("hour", &hour, 24.0), ("day", &day, 7.0), ("month", &month, 12.0)] {
            let (sin, cos) = cyclical(values, period);
            acc.computed(&format!("{}_sin", prefix), sin);
            acc.computed(&format!("{}_cos", prefix), cos);
        }

        acc.computed("is_weekend", indicator(&day, |d| d >= 5.0));
        acc.computed("is_morning_rush", indicator(&hour, |h| (6.0..=9.0).contains(&h)));
        acc.computed("is_evening_rush", indicator(&hour, |h| (17.0..=20.0).contains(&h)));
        acc.computed("is_night", indicator(&hour, |h| h >= 22.0 || h <= 5.0));

        for window in MEAN_WINDOWS {
            acc.guarded(&format!("pm25_ma_{}", window), rolling_mean(&pm25, window), &pm25);
            acc.guarded(&format!("pm10_ma_{}", window), rolling_mean(&pm10, window), &pm10);
        }

        for window in STD_WINDOWS {
            acc.zero_filled(&format!("pm25_std_{}", window), rolling_std(&pm25, window), n);
        }

        let shifted_pm10: Vec<f64> = pm10.iter().map(|v| v + 1.0).collect();
        acc.computed("pm_ratio", safe_divide(&pm25, &shifted_pm10, 0.5));

        for lag in CHANGE_LAGS {
            acc.zero_filled(&format!("pm25_diff_{}", lag), Ok(diff(&pm25, lag)), n);
        }
        for lag in CHANGE_LAGS {
            acc.zero_filled(&format!("pm25_pct_change_{}", lag), Ok(pct_change(&pm25, lag)), n);
        }

        for lag in SHIFT_LAGS {
            acc.computed(&format!("pm25_lag_{}", lag), lag_backfilled(&pm25, lag));
            acc.computed(&format!("aqi_lag_{}", lag), lag_backfilled(&aqi, lag));
        }

        // Weather composites
        let heat: Vec<f64> = temperature
            .iter()
            .zip(humidity.iter())
            .map(|(&t, &h)| heat_index(t, h))
            .collect();
        acc.guarded("heat_index", Ok(heat), &temperature);

        let temp_humid: Vec<f64> = temperature
            .iter()
            .zip(humidity.iter())
            .map(|(t, h)| t * h)
            .collect();
        acc.computed("temp_humidity_interaction", safe_divide(&temp_humid, &vec![100.0; n], 20.0));
        acc.computed("is_hot", indicator(&temperature, |t| t > 30.0));
        acc.computed("is_humid", indicator(&humidity, |h| h > 70.0));
        acc.computed("is_dry", indicator(&humidity, |h| h < 30.0));

        let pollution: Vec<f64> = (0..n)
            .map(|i| 0.5 * pm25[i] + 0.3 * pm10[i] + 0.2 * (co2[i] - 400.0).max(0.0))
            .collect();
        acc.guarded("pollution_index", Ok(pollution), &pm25);

        let zscore = match (mean(&pm25), sample_std(&pm25)) {
            (Some(mu), Some(sigma)) if sigma > 0.0 => pm25
                .iter()
                .map(|v| {
                    let z = (v - mu) / sigma;
                    if z.is_finite() {
                        z
                    } else {
                        0.0
                    }
                })
                .collect(),
            _ => vec![0.0; n],
        };
        acc.computed("is_anomaly", indicator(&zscore, |z| z.abs() > 2.0));
        acc.computed("pm25_zscore", zscore);

        acc.computed("is_dry_season", indicator(&month, |m| m >= 11.0 || m <= 3.0));
        acc.computed("is_rainy_season", indicator(&month, |m| (6.0..=9.0).contains(&m)));

        let q25 = guard(rolling_quantile(&pm25, QUANTILE_WINDOW, 0.25), &pm25);
        let q75 = guard(rolling_quantile(&pm25, QUANTILE_WINDOW, 0.75), &pm25);
        let iqr: Vec<f64> = match (&q25, &q75) {
            (FeatureOutcome::Computed(low), FeatureOutcome::Computed(high)) => {
                high.iter().zip(low.iter()).map(|(h, l)| h - l).collect()
            }
            _ => vec![0.0; n],
        };
        acc.push("pm25_quantile_25", q25);
        acc.push("pm25_quantile_75", q75);
        acc.computed("pm25_iqr", iqr);

        let FrameAccumulator { mut table, mut report } = acc;
        let summary = self.sanitizer.clean(&mut table);
        report.repaired_values = summary.repaired();
        report.feature_count = table.width();

        if !table.all_finite() {
            return Err(ForecastError::FeaturePreparationError(
                "Non-finite values remain after sanitization".to_string(),
            ));
        }

        debug!(
            rows = table.len(),
            features = table.width(),
            fallbacks = report.fallbacks.len(),
            "features prepared"
        );

        Ok(PreparedFeatures {
            frame: FeatureFrame::from_table(table),
            report,
        })
    }
}
