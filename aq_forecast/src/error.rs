//! Error types for the aq_forecast crate

use aq_math::MathError;
use thiserror::Error;

/// Custom error types for the aq_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Malformed or insufficient input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unexpected schema or pervasive non-finite data while building features
    #[error("Feature preparation error: {0}")]
    FeaturePreparationError(String),

    /// One cross-validation fold failed
    #[error("Training fold error: {0}")]
    TrainingFoldError(String),

    /// The full-data fit failed; nothing is published
    #[error("Final fit error: {0}")]
    FinalFitError(String),

    /// One recursive forecast step failed
    #[error("Forecast step error: {0}")]
    ForecastStepError(String),

    /// A regressor could not fit or predict
    #[error("Model error: {0}")]
    ModelError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No predictor has been published yet
    #[error("Model not trained: {0}")]
    NotTrained(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from JSON parsing
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Error from numeric kernels
    #[error("Math error: {0}")]
    MathError(#[from] MathError),
}

impl ForecastError {
    /// Whether this error is reported to the caller rather than absorbed
    /// into a fallback value.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ForecastError::ValidationError(_)
                | ForecastError::FeaturePreparationError(_)
                | ForecastError::FinalFitError(_)
        )
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::JsonError(err.to_string())
    }
}
