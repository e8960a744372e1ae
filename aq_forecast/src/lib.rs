//! # AQ Forecast
//!
//! Short-horizon PM2.5 and AQI forecasting from hourly sensor observations.
//!
//! ## Pipeline
//!
//! - Raw records are validated, ordered by time and sanitized ([`sanitize`])
//! - A feature table is derived from backward-looking windows only ([`features`])
//! - Features and target are robustly scaled ([`scaler`])
//! - Tree-ensemble regressors are cross-validated on time-ordered folds and
//!   weighted by their scores ([`ensemble`], [`models`])
//! - A recursive forecaster predicts hour by hour, converting to AQI and
//!   explaining each step ([`forecaster`], [`aqi`], [`factors`])
//!
//! Trained predictors are published as immutable snapshots by the
//! [`service::ForecastService`], so concurrent requests never observe a
//! half-trained model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aq_forecast::data::DataLoader;
//! use aq_forecast::service::{ForecastRequest, ForecastService};
//! use aq_forecast::PredictorConfig;
//!
//! # fn main() -> aq_forecast::Result<()> {
//! // Load hourly sensor records
//! let records = DataLoader::from_csv("sensor.csv")?;
//!
//! // Train and forecast the next 6 hours
//! let service = ForecastService::new(PredictorConfig::default())?;
//! let response = service.predict(&ForecastRequest::new("sensor-1", records))?;
//!
//! for point in &response.predictions {
//!     println!("+{}h: {:.1} µg/m³ (AQI {:.0})", point.hour_ahead, point.predicted_pm25, point.predicted_aqi);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aqi;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod ensemble;
pub mod error;
pub mod factors;
pub mod features;
pub mod forecaster;
pub mod metrics;
pub mod models;
pub mod sanitize;
pub mod scaler;
pub mod service;
pub mod utils;

// Re-export commonly used types
pub use crate::aqi::pm25_to_aqi;
pub use crate::config::PredictorConfig;
pub use crate::data::{DataLoader, Observation, ObservationRecord};
pub use crate::ensemble::{EnsembleTrainer, EnsembleWeights, TrainedEnsemble, TrainingReport};
pub use crate::error::{ForecastError, Result};
pub use crate::features::{FeatureBuilder, FeatureVector};
pub use crate::forecaster::{ForecastPoint, RecursiveForecaster};
pub use crate::models::{Regressor, TrainedRegressor};
pub use crate::sanitize::Sanitizer;
pub use crate::service::{ForecastRequest, ForecastResponse, ForecastService};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
