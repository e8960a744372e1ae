//! Forecast service: trains predictors and publishes them as immutable
//! snapshots
//!
//! Training happens outside the lock; publishing is a single pointer swap.
//! Readers clone the current [`Arc`] and never block a concurrent training.
//! A training call that fails leaves the previously published predictor in
//! service.

use crate::config::PredictorConfig;
use crate::data::{latest_raw_pm25, observations_from_records, Observation, ObservationRecord};
use crate::ensemble::{EnsembleTrainer, EnsembleWeights, TrainedEnsemble, TrainingReport};
use crate::error::{ForecastError, Result};
use crate::forecaster::{ForecastPoint, RecursiveForecaster};
use crate::metrics::ForecastStatistics;
use crate::models::{sequence_model_available, Regressor};
use crate::sanitize::Sanitizer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

fn default_sensor_id() -> String {
    "unknown".to_string()
}

fn default_use_ensemble() -> bool {
    true
}

/// A forecast request as received from a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    #[serde(rename = "sensorId", alias = "sensor_id", default = "default_sensor_id")]
    pub sensor_id: String,
    pub data: Vec<ObservationRecord>,
    /// Requested horizon; the configured default horizon when absent
    #[serde(
        rename = "hoursAhead",
        alias = "hours_ahead",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hours_ahead: Option<usize>,
    #[serde(rename = "useEnsemble", alias = "use_ensemble", default = "default_use_ensemble")]
    pub use_ensemble: bool,
}

impl ForecastRequest {
    /// Request with default options
    pub fn new(sensor_id: impl Into<String>, data: Vec<ObservationRecord>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            data,
            hours_ahead: None,
            use_ensemble: default_use_ensemble(),
        }
    }

    pub fn with_hours_ahead(mut self, hours_ahead: usize) -> Self {
        self.hours_ahead = Some(hours_ahead);
        self
    }

    pub fn with_ensemble(mut self, use_ensemble: bool) -> Self {
        self.use_ensemble = use_ensemble;
        self
    }
}

/// Result of a successful forecast request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub sensor_id: String,
    pub predictions: Vec<ForecastPoint>,
    pub statistics: Option<ForecastStatistics>,
    pub model_performance: TrainingReport,
    pub timestamp: DateTime<Utc>,
    pub hours_predicted: usize,
}

/// An immutable, published predictor
#[derive(Debug)]
pub struct Predictor {
    ensemble: TrainedEnsemble,
    generation: u64,
    trained_at: DateTime<Utc>,
}

impl Predictor {
    pub fn ensemble(&self) -> &TrainedEnsemble {
        &self.ensemble
    }

    /// Monotonic publish counter, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

/// Description of the published predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub variants: Vec<String>,
    pub trained_variants: Vec<String>,
    pub ensemble_weights: EnsembleWeights,
    pub features_count: usize,
    pub min_data_points: usize,
    pub sequence_model_available: bool,
    pub generation: Option<u64>,
    pub trained_at: Option<DateTime<Utc>>,
}

/// Liveness summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub models_available: Vec<String>,
    pub sequence_model_available: bool,
    pub trained: bool,
    pub timestamp: DateTime<Utc>,
}

/// Trains, publishes and serves air-quality predictors
#[derive(Debug)]
pub struct ForecastService {
    config: PredictorConfig,
    sanitizer: Sanitizer,
    trainer: EnsembleTrainer,
    forecaster: RecursiveForecaster,
    current: RwLock<Option<Arc<Predictor>>>,
    generation: AtomicU64,
}

impl ForecastService {
    /// Create a service over the variants compiled into this build
    pub fn new(config: PredictorConfig) -> Result<Self> {
        config.validate()?;
        let trainer = EnsembleTrainer::new(config.clone());
        Ok(Self::assemble(config, trainer))
    }

    /// Create a service over an explicit set of regressor variants
    pub fn with_variants(config: PredictorConfig, variants: Vec<Arc<dyn Regressor>>) -> Result<Self> {
        config.validate()?;
        let trainer = EnsembleTrainer::with_variants(config.clone(), variants);
        Ok(Self::assemble(config, trainer))
    }

    fn assemble(config: PredictorConfig, trainer: EnsembleTrainer) -> Self {
        Self {
            sanitizer: Sanitizer::new(config.clip_percentiles),
            forecaster: RecursiveForecaster::new(&config),
            trainer,
            config,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Currently published predictor
    pub fn current(&self) -> Option<Arc<Predictor>> {
        self.current.read().clone()
    }

    /// Number of predictors published so far
    pub fn published_count(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Validate and sanitize raw records
    pub fn prepare(&self, records: &[ObservationRecord]) -> Result<Vec<Observation>> {
        if records.len() < self.config.min_data_points {
            return Err(ForecastError::ValidationError(format!(
                "Minimum {} data points required, got {}",
                self.config.min_data_points,
                records.len()
            )));
        }
        observations_from_records(records, &self.sanitizer)
    }

    /// Train on `records` and forecast from them
    pub fn predict(&self, request: &ForecastRequest) -> Result<ForecastResponse> {
        let hours = self.config.resolve_horizon(request.hours_ahead);
        info!(
            sensor = %request.sensor_id,
            points = request.data.len(),
            hours,
            "forecast requested"
        );

        let observations = self.prepare(&request.data).map_err(log_surfaced)?;
        let predictor = self
            .train_and_publish(&observations, request.use_ensemble)
            .map_err(log_surfaced)?;

        let predictions = self
            .run_forecast(&predictor, &request.data, &observations, hours)
            .map_err(log_surfaced)?;

        info!(sensor = %request.sensor_id, hours = predictions.len(), "forecast generated");

        Ok(ForecastResponse {
            sensor_id: request.sensor_id.clone(),
            statistics: ForecastStatistics::from_points(&predictions),
            model_performance: predictor.ensemble.report().clone(),
            timestamp: Utc::now(),
            hours_predicted: predictions.len(),
            predictions,
        })
    }

    /// Train on `records` and publish the result without forecasting
    pub fn retrain(&self, records: &[ObservationRecord], use_ensemble: bool) -> Result<TrainingReport> {
        let observations = self.prepare(records).map_err(log_surfaced)?;
        let predictor = self
            .train_and_publish(&observations, use_ensemble)
            .map_err(log_surfaced)?;
        Ok(predictor.ensemble.report().clone())
    }

    /// Forecast from `records` with the published predictor, without training
    pub fn forecast_with_current(
        &self,
        records: &[ObservationRecord],
        hours_ahead: usize,
    ) -> Result<Vec<ForecastPoint>> {
        let predictor = self.current().ok_or_else(|| {
            ForecastError::NotTrained("no predictor has been published".to_string())
        })?;
        let observations = observations_from_records(records, &self.sanitizer)?;
        let hours = self.config.clamp_horizon(hours_ahead);
        self.run_forecast(&predictor, records, &observations, hours)
    }

    /// Fallback points repeat the latest raw reading, not the clipped one
    fn run_forecast(
        &self,
        predictor: &Predictor,
        records: &[ObservationRecord],
        observations: &[Observation],
        hours: usize,
    ) -> Result<Vec<ForecastPoint>> {
        match latest_raw_pm25(records) {
            Some(reading) => self.forecaster.forecast_with_last_reading(
                &predictor.ensemble,
                observations,
                hours,
                reading,
            ),
            None => self
                .forecaster
                .forecast(&predictor.ensemble, observations, hours),
        }
    }

    fn train_and_publish(&self, observations: &[Observation], use_ensemble: bool) -> Result<Arc<Predictor>> {
        let ensemble = self.trainer.fit(observations, use_ensemble)?;

        // Numbering under the write lock keeps published generations in order
        let mut current = self.current.write();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let predictor = Arc::new(Predictor {
            ensemble,
            generation,
            trained_at: Utc::now(),
        });
        *current = Some(Arc::clone(&predictor));
        drop(current);

        info!(generation, "predictor published");
        Ok(predictor)
    }

    /// Description of the published predictor
    pub fn model_info(&self) -> ModelInfo {
        let current = self.current();
        ModelInfo {
            version: self.config.model_version.clone(),
            variants: self.trainer.variant_names(),
            trained_variants: current
                .as_ref()
                .map(|p| p.ensemble.member_names())
                .unwrap_or_default(),
            ensemble_weights: current
                .as_ref()
                .map(|p| p.ensemble.weights().clone())
                .unwrap_or_default(),
            features_count: current
                .as_ref()
                .map_or(0, |p| p.ensemble.feature_names().len()),
            min_data_points: self.config.min_data_points,
            sequence_model_available: sequence_model_available(),
            generation: current.as_ref().map(|p| p.generation),
            trained_at: current.as_ref().map(|p| p.trained_at),
        }
    }

    pub fn health(&self) -> HealthStatus {
        let current = self.current();
        HealthStatus {
            status: "healthy".to_string(),
            version: self.config.model_version.clone(),
            models_available: current
                .as_ref()
                .map(|p| p.ensemble.member_names())
                .unwrap_or_default(),
            sequence_model_available: sequence_model_available(),
            trained: current.is_some(),
            timestamp: Utc::now(),
        }
    }
}

fn log_surfaced(e: ForecastError) -> ForecastError {
    if e.is_user_visible() {
        error!(error = %e, "request failed");
    }
    e
}
