//! Data-quality diagnostics over raw records

use crate::data::{observations_from_records, ObservationRecord, OBSERVATION_COLUMNS};
use crate::sanitize::Sanitizer;
use aq_math::{mean, sample_std};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics of one raw numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDiagnostics {
    /// Records without a value
    pub missing: usize,
    /// Records with an infinite or NaN value
    pub non_finite: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub has_negatives: bool,
    pub has_zeros: bool,
}

/// Outcome of running validation on the records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub cleaned_rows: Option<usize>,
}

/// Diagnostics for a batch of raw records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDiagnostics {
    pub records: usize,
    pub missing_timestamps: usize,
    pub columns: BTreeMap<String, ColumnDiagnostics>,
    pub validation: ValidationOutcome,
}

impl DataDiagnostics {
    /// Inspect `records` without modifying them
    pub fn inspect(records: &[ObservationRecord], sanitizer: &Sanitizer) -> Self {
        let columns = OBSERVATION_COLUMNS
            .iter()
            .map(|&column| {
                let present: Vec<f64> = records.iter().filter_map(|r| r.field(column)).collect();
                (column.to_string(), column_diagnostics(records.len(), &present))
            })
            .collect();

        let validation = match observations_from_records(records, sanitizer) {
            Ok(observations) => ValidationOutcome {
                success: true,
                error: None,
                cleaned_rows: Some(observations.len()),
            },
            Err(e) => ValidationOutcome {
                success: false,
                error: Some(e.to_string()),
                cleaned_rows: None,
            },
        };

        Self {
            records: records.len(),
            missing_timestamps: records.iter().filter(|r| r.timestamp.is_none()).count(),
            columns,
            validation,
        }
    }
}

fn column_diagnostics(total: usize, present: &[f64]) -> ColumnDiagnostics {
    let finite: Vec<f64> = present.iter().copied().filter(|v| v.is_finite()).collect();
    ColumnDiagnostics {
        missing: total - present.len(),
        non_finite: present.len() - finite.len(),
        mean: mean(&finite),
        std: sample_std(&finite),
        min: finite.iter().copied().reduce(f64::min),
        max: finite.iter().copied().reduce(f64::max),
        has_negatives: finite.iter().any(|v| *v < 0.0),
        has_zeros: finite.iter().any(|v| *v == 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic_records;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_counts_missing_and_non_finite() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut records = synthetic_records(5, start, 2);
        records[0].pm10 = None;
        records[1].pm10 = Some(f64::INFINITY);
        records[2].temperature = Some(-3.0);

        let diagnostics = DataDiagnostics::inspect(&records, &Sanitizer::default());
        let pm10 = &diagnostics.columns["pm10"];
        assert_eq!(diagnostics.records, 5);
        assert_eq!(pm10.missing, 1);
        assert_eq!(pm10.non_finite, 1);
        assert!(diagnostics.columns["temperature"].has_negatives);
        assert!(diagnostics.validation.success);
        assert_eq!(diagnostics.validation.cleaned_rows, Some(5));
    }

    #[test]
    fn test_reports_validation_failure() {
        let diagnostics = DataDiagnostics::inspect(&[], &Sanitizer::default());
        assert!(!diagnostics.validation.success);
        assert!(diagnostics.validation.error.is_some());
        assert_eq!(diagnostics.columns["pm25"].mean, None);
    }
}
