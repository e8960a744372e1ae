//! Utility functions for the aq_forecast crate

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Utc};

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Replace a non-finite value with `fallback`
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Element-wise division that yields `fallback` wherever the denominator is
/// zero or the quotient is not finite.
pub fn safe_divide(numerator: &[f64], denominator: &[f64], fallback: f64) -> Vec<f64> {
    numerator
        .iter()
        .zip(denominator.iter())
        .map(|(&n, &d)| {
            if d == 0.0 {
                fallback
            } else {
                finite_or(n / d, fallback)
            }
        })
        .collect()
}

/// Timestamp `hours` after `base`
pub fn hours_after(base: DateTime<Utc>, hours: usize) -> DateTime<Utc> {
    base + Duration::hours(hours as i64)
}

/// Timestamp parsing for sensor records
pub mod date_parser {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    /// Parse an ISO-8601 timestamp.
    ///
    /// Accepts RFC 3339 strings (`Z` or explicit offset), naive date-times
    /// (interpreted as UTC) and bare dates (midnight UTC).
    pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
        let value = value.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Ok(parsed.with_timezone(&Utc));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(naive.and_utc());
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }

        Err(ForecastError::ValidationError(format!(
            "Unparseable timestamp: {}",
            value
        )))
    }
}
