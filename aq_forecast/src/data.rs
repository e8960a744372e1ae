//! Sensor observation handling
//!
//! Raw records arrive from JSON or CSV with every numeric field optional.
//! [`observations_from_records`] validates them, orders them by time and runs
//! them through the [`Sanitizer`] to produce clean [`Observation`]s.

use crate::aqi::pm25_to_aqi;
use crate::error::{ForecastError, Result};
use crate::sanitize::Sanitizer;
use crate::utils::date_parser::parse_timestamp;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs::File;
use std::path::Path;

/// Column names of the observation table, in storage order
pub const OBSERVATION_COLUMNS: [&str; 9] = [
    "pm25",
    "pm10",
    "co2",
    "temperature",
    "humidity",
    "hour",
    "dayOfWeek",
    "month",
    "aqi",
];

/// Fields that must be present for a record set to be usable
pub const REQUIRED_FIELDS: [&str; 8] = [
    "timestamp",
    "pm25",
    "pm10",
    "co2",
    "temperature",
    "humidity",
    "hour",
    "aqi",
];

/// One clean, timestamped sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub pm25: f64,
    pub pm10: f64,
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub hour: f64,
    pub day_of_week: f64,
    pub month: f64,
    pub aqi: f64,
}

impl Observation {
    /// Value of a named observation column
    pub fn get(&self, column: &str) -> Option<f64> {
        match column {
            "pm25" => Some(self.pm25),
            "pm10" => Some(self.pm10),
            "co2" => Some(self.co2),
            "temperature" => Some(self.temperature),
            "humidity" => Some(self.humidity),
            "hour" => Some(self.hour),
            "dayOfWeek" => Some(self.day_of_week),
            "month" => Some(self.month),
            "aqi" => Some(self.aqi),
            _ => None,
        }
    }
}

/// A sensor reading as supplied by a caller, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub pm25: Option<f64>,
    #[serde(default)]
    pub pm10: Option<f64>,
    #[serde(default)]
    pub co2: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub hour: Option<f64>,
    #[serde(default, alias = "day_of_week")]
    pub day_of_week: Option<f64>,
    #[serde(default)]
    pub month: Option<f64>,
    #[serde(default)]
    pub aqi: Option<f64>,
}

impl ObservationRecord {
    /// Value of a named numeric field
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "pm25" => self.pm25,
            "pm10" => self.pm10,
            "co2" => self.co2,
            "temperature" => self.temperature,
            "humidity" => self.humidity,
            "hour" => self.hour,
            "dayOfWeek" => self.day_of_week,
            "month" => self.month,
            "aqi" => self.aqi,
            _ => None,
        }
    }

    fn has_field(&self, name: &str) -> bool {
        match name {
            "timestamp" => self.timestamp.is_some(),
            other => self.field(other).is_some(),
        }
    }
}

/// A named, column-major numeric table; NaN marks a missing value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ColumnTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, replacing any existing column with the same name
    pub fn insert(&mut self, name: &str, values: Vec<f64>) {
        match self.position(name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
    }

    /// Index of a named column
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of a named column
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|idx| self.columns[idx].as_slice())
    }

    /// Mutable values of a named column
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        match self.position(name) {
            Some(idx) => Some(&mut self.columns[idx]),
            None => None,
        }
    }

    /// Column names in insertion order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// All columns in insertion order
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Mutable access to every column
    pub fn columns_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.columns
    }

    /// Number of rows (length of the first column)
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Row `index` as a dense vector in column order
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[index]).collect()
    }

    /// Every row, in order
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.len()).map(|i| self.row(i)).collect()
    }

    /// Whether every value in the table is finite
    pub fn all_finite(&self) -> bool {
        self.columns.iter().flatten().all(|v| v.is_finite())
    }
}

/// Names of required fields that no record carries
pub fn missing_required_fields(records: &[ObservationRecord]) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !records.iter().any(|r| r.has_field(field)))
        .collect()
}

/// Validate, order and sanitize raw records.
///
/// Calendar fields (`hour`, `dayOfWeek`, `month`) missing from a record are
/// derived from its timestamp; any other missing value is imputed by the
/// sanitizer.
pub fn observations_from_records(
    records: &[ObservationRecord],
    sanitizer: &Sanitizer,
) -> Result<Vec<Observation>> {
    if records.is_empty() {
        return Err(ForecastError::ValidationError(
            "No observations supplied".to_string(),
        ));
    }

    let missing = missing_required_fields(records);
    if !missing.is_empty() {
        return Err(ForecastError::ValidationError(format!(
            "Missing fields: {:?}",
            missing
        )));
    }

    let mut timed = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let raw = record.timestamp.as_deref().ok_or_else(|| {
            ForecastError::ValidationError(format!("Record {} has no timestamp", idx))
        })?;
        timed.push((parse_timestamp(raw)?, record));
    }
    // Stable sort keeps duplicate timestamps in arrival order
    timed.sort_by_key(|(ts, _)| *ts);

    let mut table = ColumnTable::new();
    for column in OBSERVATION_COLUMNS {
        let values = timed
            .iter()
            .map(|(ts, record)| {
                record
                    .field(column)
                    .or_else(|| calendar_field(ts, column))
                    .unwrap_or(f64::NAN)
            })
            .collect();
        table.insert(column, values);
    }

    sanitizer.apply_domain_clamps(&mut table);
    sanitizer.clean(&mut table);

    let observations = timed
        .iter()
        .enumerate()
        .map(|(i, (ts, _))| {
            let value = |name: &str| table.column(name).map_or(0.0, |c| c[i]);
            Observation {
                timestamp: *ts,
                pm25: value("pm25"),
                pm10: value("pm10"),
                co2: value("co2"),
                temperature: value("temperature"),
                humidity: value("humidity"),
                hour: value("hour"),
                day_of_week: value("dayOfWeek"),
                month: value("month"),
                aqi: value("aqi"),
            }
        })
        .collect();

    Ok(observations)
}

/// Most recent finite PM2.5 reading as supplied, before sanitizing.
///
/// Records without a parseable timestamp are ignored; among records sharing
/// the latest timestamp the one supplied last wins.
pub fn latest_raw_pm25(records: &[ObservationRecord]) -> Option<f64> {
    records
        .iter()
        .filter_map(|r| {
            let ts = parse_timestamp(r.timestamp.as_deref()?).ok()?;
            r.pm25.filter(|v| v.is_finite()).map(|v| (ts, v))
        })
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, v)| v)
}

/// Calendar column derived from a timestamp (Monday = 0)
fn calendar_field(ts: &DateTime<Utc>, column: &str) -> Option<f64> {
    match column {
        "hour" => Some(ts.hour() as f64),
        "dayOfWeek" => Some(ts.weekday().num_days_from_monday() as f64),
        "month" => Some(ts.month() as f64),
        _ => None,
    }
}

/// Observation columns as a [`ColumnTable`]
pub fn observation_table(observations: &[Observation]) -> ColumnTable {
    let mut table = ColumnTable::new();
    for column in OBSERVATION_COLUMNS {
        let values = observations
            .iter()
            .map(|o| o.get(column).unwrap_or(f64::NAN))
            .collect();
        table.insert(column, values);
    }
    table
}

/// Data loader for sensor records
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load records from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ObservationRecord>> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: ObservationRecord = row?;
            records.push(record);
        }
        Ok(records)
    }

    /// Load records from a JSON array
    pub fn from_json_str(json: &str) -> Result<Vec<ObservationRecord>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Generate an hourly synthetic sensor series with a daily pollution cycle.
///
/// Deterministic for a given `seed`.
pub fn synthetic_records(n: usize, start: DateTime<Utc>, seed: u64) -> Vec<ObservationRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    // Unit-variance noise scaled per channel; the parameters are constant and valid
    let noise = match Normal::new(0.0, 1.0) {
        Ok(dist) => dist,
        Err(_) => return Vec::new(),
    };

    (0..n)
        .map(|i| {
            let ts = start + Duration::hours(i as i64);
            let hour = ts.hour() as f64;
            let daily = (2.0 * PI * (hour - 8.0) / 24.0).sin();

            let pm25 = (35.0 + 15.0 * daily + 3.0 * noise.sample(&mut rng)).max(1.0);
            let pm10 = pm25 * 1.6 + 4.0 * noise.sample(&mut rng).abs();
            let co2 = 420.0 + 2.0 * pm25 + 10.0 * noise.sample(&mut rng);
            let temperature = 26.0 + 6.0 * daily + noise.sample(&mut rng);
            let humidity = (60.0 - 15.0 * daily + 3.0 * noise.sample(&mut rng)).clamp(5.0, 100.0);

            ObservationRecord {
                timestamp: Some(ts.to_rfc3339()),
                pm25: Some(pm25),
                pm10: Some(pm10),
                co2: Some(co2),
                temperature: Some(temperature),
                humidity: Some(humidity),
                hour: Some(hour),
                day_of_week: Some(ts.weekday().num_days_from_monday() as f64),
                month: Some(ts.month() as f64),
                aqi: Some(pm25_to_aqi(pm25)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_latest_raw_pm25() {
        let mut records = synthetic_records(4, start(), 2);
        records.reverse();
        records[0].pm25 = Some(950.0);
        assert_eq!(latest_raw_pm25(&records), Some(950.0));

        // A missing latest reading falls back to the previous hour
        records[0].pm25 = None;
        assert_eq!(latest_raw_pm25(&records), records[1].pm25);

        assert_eq!(latest_raw_pm25(&[]), None);
    }

    #[test]
    fn test_records_are_sorted() {
        let mut records = synthetic_records(5, start(), 1);
        records.reverse();

        let observations = observations_from_records(&records, &Sanitizer::default()).unwrap();
        let times: Vec<_> = observations.iter().map(|o| o.timestamp).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_missing_required_field() {
        let mut records = synthetic_records(3, start(), 1);
        for record in &mut records {
            record.co2 = None;
        }

        let err = observations_from_records(&records, &Sanitizer::default()).unwrap_err();
        assert!(matches!(err, ForecastError::ValidationError(_)));
        assert!(err.to_string().contains("co2"));
    }

    #[test]
    fn test_calendar_fields_derived_from_timestamp() {
        let mut records = synthetic_records(3, start(), 1);
        for record in &mut records {
            record.day_of_week = None;
            record.month = None;
        }

        let observations = observations_from_records(&records, &Sanitizer::default()).unwrap();
        // 2024-01-01 was a Monday
        assert_eq!(observations[0].day_of_week, 0.0);
        assert_eq!(observations[0].month, 1.0);
    }

    #[test]
    fn test_null_values_imputed() {
        let mut records = synthetic_records(10, start(), 3);
        records[4].pm25 = None;

        let observations = observations_from_records(&records, &Sanitizer::default()).unwrap();
        assert!(observations[4].pm25.is_finite());
    }

    #[test]
    fn test_json_records_accept_both_casings() {
        let json = r#"[
            {"timestamp": "2024-01-01T00:00:00Z", "pm25": 10.0, "dayOfWeek": 0},
            {"timestamp": "2024-01-01T01:00:00Z", "pm25": null, "day_of_week": 0}
        ]"#;
        let records = DataLoader::from_json_str(json).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].day_of_week, Some(0.0));
        assert_eq!(records[1].day_of_week, Some(0.0));
        assert_eq!(records[1].pm25, None);
    }

    #[test]
    fn test_column_table_rows() {
        let mut table = ColumnTable::new();
        table.insert("a", vec![1.0, 2.0]);
        table.insert("b", vec![3.0, 4.0]);
        table.insert("a", vec![5.0, 6.0]);

        assert_eq!(table.width(), 2);
        assert_eq!(table.row(1), vec![6.0, 4.0]);
        assert_eq!(table.column("b"), Some(&[3.0, 4.0][..]));
        assert!(table.all_finite());
    }
}
