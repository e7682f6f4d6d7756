//! Error types for the Kolosal explain crate

use thiserror::Error;

/// Result type alias for Kolosal operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Main error type for model serving and explanation
#[derive(Error, Debug)]
pub enum KolosalError {
    /// An operation was invoked before a model artifact was loaded
    #[error("Model not ready: no artifact has been loaded")]
    NotReady,

    /// A record is missing a feature, carries an extra one, or has a mistyped value
    #[error("Validation error on feature '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The operation is not available for the model's task
    #[error("Operation '{operation}' is not supported for {task} tasks")]
    UnsupportedTask { operation: String, task: String },

    /// The base predictor does not belong to an explainable family
    #[error("Model family '{0}' does not support explanations")]
    UnsupportedModel(String),

    /// The attribution capability returned an output this crate cannot normalise
    #[error("Explain error: {0}")]
    Explain(String),

    /// Malformed estimator composition (empty pipeline, bad calibrator, ...)
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KolosalError {
    /// Shorthand for a validation failure on a named feature
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        KolosalError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for KolosalError {
    fn from(err: polars::error::PolarsError) -> Self {
        KolosalError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KolosalError {
    fn from(err: ndarray::ShapeError) -> Self {
        KolosalError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
