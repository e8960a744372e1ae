//! Numeric sanitization of observation and feature tables
//!
//! The sanitizer never fails: whatever it is given, every value it hands
//! back is finite.

use crate::data::ColumnTable;
use aq_math::{median, quantile};
use tracing::warn;

/// Physical plausibility bounds applied before general cleaning
pub const DOMAIN_BOUNDS: [(&str, f64, f64); 7] = [
    ("pm25", 0.0, 1000.0),
    ("pm10", 0.0, 1000.0),
    ("co2", 300.0, 10000.0),
    ("aqi", 0.0, 500.0),
    ("temperature", -50.0, 60.0),
    ("humidity", 0.0, 100.0),
    ("month", 1.0, 12.0),
];

/// Calendar columns are never percentile-clipped
pub const CALENDAR_COLUMNS: [&str; 3] = ["hour", "dayOfWeek", "month"];

/// What cleaning did to one column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnCleanup {
    /// Infinite values turned into missing
    pub infinite: usize,
    /// Missing values imputed
    pub imputed: usize,
    /// Values that were still non-finite after imputation and forced to 0
    pub zeroed: usize,
}

/// Per-column cleanup summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizeSummary {
    pub columns: Vec<(String, ColumnCleanup)>,
}

impl SanitizeSummary {
    /// Total number of values that were changed because they were not finite
    pub fn repaired(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, c)| c.infinite.max(c.imputed) + c.zeroed)
            .sum()
    }
}

/// Clips and imputes invalid values in a numeric table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    clip_percentiles: bool,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Sanitizer {
    /// Create a sanitizer; `clip_percentiles` bounds each column to its
    /// 1st/99th percentile before imputation.
    pub fn new(clip_percentiles: bool) -> Self {
        Self { clip_percentiles }
    }

    /// Sanitizer that only enforces finiteness
    pub fn finite_only() -> Self {
        Self::new(false)
    }

    /// Whether percentile clipping is enabled
    pub fn clips_percentiles(&self) -> bool {
        self.clip_percentiles
    }

    /// Apply physical range clamps and calendar wrap-around to the known
    /// observation columns. Missing values stay missing.
    pub fn apply_domain_clamps(&self, table: &mut ColumnTable) {
        for (name, low, high) in DOMAIN_BOUNDS {
            if let Some(values) = table.column_mut(name) {
                for v in values.iter_mut() {
                    if !v.is_nan() {
                        *v = v.clamp(low, high);
                    }
                }
            }
        }

        for (name, modulus) in [("hour", 24.0), ("dayOfWeek", 7.0)] {
            if let Some(values) = table.column_mut(name) {
                for v in values.iter_mut() {
                    *v = v.rem_euclid(modulus);
                }
            }
        }
    }

    /// Clean every column of a table in place
    pub fn clean(&self, table: &mut ColumnTable) -> SanitizeSummary {
        let names: Vec<String> = table.names().to_vec();
        let mut summary = SanitizeSummary::default();

        for (name, values) in names.into_iter().zip(table.columns_mut().iter_mut()) {
            let clip = self.clip_percentiles && !CALENDAR_COLUMNS.contains(&name.as_str());
            let cleanup = clean_values(values, clip);
            if cleanup.zeroed > 0 {
                warn!(column = %name, zeroed = cleanup.zeroed, "non-finite values replaced by 0");
            }
            summary.columns.push((name, cleanup));
        }

        summary
    }

    /// Clean a single column in place
    pub fn clean_column(&self, values: &mut [f64]) -> ColumnCleanup {
        clean_values(values, self.clip_percentiles)
    }
}

fn clean_values(values: &mut [f64], clip_percentiles: bool) -> ColumnCleanup {
    let mut cleanup = ColumnCleanup::default();

    for v in values.iter_mut() {
        if v.is_infinite() {
            *v = f64::NAN;
            cleanup.infinite += 1;
        }
    }

    if clip_percentiles {
        if let (Some(low), Some(high)) = (quantile(values, 0.01), quantile(values, 0.99)) {
            for v in values.iter_mut() {
                if !v.is_nan() {
                    *v = v.clamp(low, high);
                }
            }
        }
    }

    if values.iter().any(|v| v.is_nan()) {
        let fill = median(values).unwrap_or(0.0);
        for v in values.iter_mut() {
            if v.is_nan() {
                *v = fill;
                cleanup.imputed += 1;
            }
        }
    }

    // Whatever slipped through becomes 0
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
            cleanup.zeroed += 1;
        }
    }

    cleanup
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table_with(name: &str, values: Vec<f64>) -> ColumnTable {
        let mut table = ColumnTable::new();
        table.insert(name, values);
        table
    }

    #[test]
    fn test_infinite_and_missing_become_median() {
        let mut values = vec![1.0, f64::INFINITY, 3.0, f64::NAN, 5.0];
        let cleanup = Sanitizer::finite_only().clean_column(&mut values);

        assert_eq!(values, vec![1.0, 3.0, 3.0, 3.0, 5.0]);
        assert_eq!(cleanup.infinite, 1);
        assert_eq!(cleanup.imputed, 2);
        assert_eq!(cleanup.zeroed, 0);
    }

    #[test]
    fn test_all_missing_column_becomes_zero() {
        let mut values = vec![f64::NAN, f64::NEG_INFINITY];
        Sanitizer::default().clean_column(&mut values);
        assert_eq!(values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_percentile_clipping_bounds_outliers() {
        let mut values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        values.push(1.0e6);
        Sanitizer::default().clean_column(&mut values);

        let max = values.iter().cloned().fold(f64::MIN, f64::max);
        assert!(max < 1.0e6);
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[rstest]
    #[case("pm25", -5.0, 0.0)]
    #[case("pm25", 5000.0, 1000.0)]
    #[case("co2", 100.0, 300.0)]
    #[case("aqi", 900.0, 500.0)]
    #[case("temperature", -80.0, -50.0)]
    #[case("humidity", 120.0, 100.0)]
    #[case("hour", 25.0, 1.0)]
    #[case("hour", -1.0, 23.0)]
    #[case("dayOfWeek", 8.0, 1.0)]
    #[case("month", 0.0, 1.0)]
    #[case("month", 14.0, 12.0)]
    fn test_domain_clamps(#[case] column: &str, #[case] raw: f64, #[case] expected: f64) {
        let mut table = table_with(column, vec![raw]);
        Sanitizer::default().apply_domain_clamps(&mut table);
        assert_eq!(table.column(column).unwrap()[0], expected);
    }

    #[test]
    fn test_calendar_columns_not_clipped() {
        let hours: Vec<f64> = (0..100).map(|i| (i % 24) as f64).collect();
        let mut table = table_with("hour", hours.clone());
        Sanitizer::default().clean(&mut table);
        assert_eq!(table.column("hour").unwrap(), hours.as_slice());
    }

    #[test]
    fn test_clean_table_is_finite() {
        let mut table = table_with("pm25", vec![f64::NAN, 12.0, f64::INFINITY]);
        table.insert("pm10", vec![f64::NAN, f64::NAN, f64::NAN]);

        let summary = Sanitizer::default().clean(&mut table);
        assert!(table.all_finite());
        assert_eq!(summary.columns.len(), 2);
        assert!(summary.repaired() >= 4);
    }
}
