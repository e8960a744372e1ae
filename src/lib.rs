//! # AirLight
//!
//! `airlight_workspace` bundles the AirLight forecasting crates behind one
//! dependency.
//!
//! - [`math`]: rolling-window statistics and error metrics (`aq_math`)
//! - [`forecast`]: the sanitize → features → ensemble → recursive forecast
//!   pipeline (`aq_forecast`)
//!
//! ## Example
//!
//! ```
//! use airlight_workspace::forecast::pm25_to_aqi;
//!
//! assert_eq!(pm25_to_aqi(12.0), 50.0);
//! assert_eq!(pm25_to_aqi(35.4), 100.0);
//! ```

pub use aq_forecast as forecast;
pub use aq_math as math;

/// Versions of the bundled crates as `(name, version)` pairs.
///
/// # Examples
///
/// ```
/// let versions = airlight_workspace::component_versions();
/// assert_eq!(versions[0].0, "aq_forecast");
/// ```
pub fn component_versions() -> [(&'static str, &'static str); 2] {
    [
        (aq_forecast::NAME, aq_forecast::VERSION),
        ("aq_math", aq_math::VERSION),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast::data::synthetic_records;
    use forecast::{ForecastRequest, ForecastService, PredictorConfig};

    #[test]
    fn test_component_versions() {
        let versions = component_versions();
        assert_eq!(versions[0].0, "aq_forecast");
        assert!(!versions[1].1.is_empty());
    }

    #[test]
    fn test_end_to_end_smoke() {
        let mut config = PredictorConfig::default();
        config.random_forest.n_estimators = 5;
        config.gradient_boosting.n_estimators = 5;

        let start = chrono::DateTime::parse_from_rfc3339("2024-04-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let service = ForecastService::new(config).unwrap();
        let response = service
            .predict(&ForecastRequest::new("smoke", synthetic_records(48, start, 1)).with_hours_ahead(2))
            .unwrap();

        assert_eq!(response.predictions.len(), 2);
        assert_eq!(math::mean(&[1.0, 3.0]), Some(2.0));
    }
}
