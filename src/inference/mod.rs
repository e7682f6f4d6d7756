//! Inference engine module
//!
//! Provides model serving with:
//! - Readiness gating until an artifact is loaded
//! - Schema validation of single records and batches
//! - Predictions, class probabilities and feature attributions
//! - Latency tracking and performance metrics

mod config;
mod engine;

pub use config::{ExplainerConfig, InferenceConfig};
pub use engine::{InferenceEngine, InferenceStats, Prediction};
