//! # AQ Math
//!
//! Numeric kernels for air-quality time series.
//! This crate provides backward-looking rolling statistics, order statistics
//! and regression error metrics shared by the forecasting pipeline.

use thiserror::Error;

pub mod metrics;
pub mod rolling;
pub mod stats;

pub use metrics::{mean_absolute_error, r2_score, root_mean_squared_error, ErrorMetrics};
pub use stats::{mean, median, population_std, quantile, sample_std};

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Version of the math crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MathError::InvalidInput("window must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid input: window must be positive");
    }
}

