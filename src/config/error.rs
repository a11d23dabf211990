//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("At least one retry interval is required")]
    NoRetryIntervals,

    #[error("Retry intervals must be positive day offsets")]
    NonPositiveRetryInterval,

    #[error("Retry intervals must be non-decreasing")]
    DecreasingRetryIntervals,

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),
}
