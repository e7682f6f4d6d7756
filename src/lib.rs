//! Kolosal Explain - prediction and feature attribution serving
//!
//! This crate serves trained supervised models (classifiers and regressors)
//! behind a uniform contract: validate records against the model's feature
//! schema, then predict, compute class probabilities, or explain.
//!
//! # Modules
//!
//! ## Serving
//! - [`inference`] - Inference engine and configuration
//! - [`artifact`] - Model artifact loading and load-time validation
//! - [`schema`] - Feature schema and record validation
//!
//! ## Models
//! - [`estimator`] - Pipelines, calibration wrappers, base predictor families
//!
//! ## Explainability
//! - [`explainability`] - Attribution providers and normalized results
//!   (TreeSHAP, interventional Shapley)
//!
//! ## Infrastructure
//! - [`monitoring`] - Performance metrics
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use kolosal_explain::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let engine = InferenceEngine::load(InferenceConfig::default(), "model.json")?;
//! let records = Records::try_from(json!({"age": 30, "color": "red"}))?;
//!
//! let labels = engine.predict(&records)?;
//! let attributions = engine.explain(&records, None)?;
//! println!("{:?} {}", labels, serde_json::to_string(&attributions)?);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;

// Serving
pub mod artifact;
pub mod inference;
pub mod schema;

// Models
pub mod estimator;

// Explainability
pub mod explainability;

// Infrastructure
pub mod monitoring;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result};

    // Schema
    pub use crate::schema::{
        FeatureKind, FeatureSchema, FeatureSpec, FeatureValidator, ModelMetadata, Record, Records,
        TaskKind,
    };

    // Models
    pub use crate::artifact::ModelArtifact;
    pub use crate::estimator::{
        resolve_base_predictor, BasePredictor, Estimator, PredictorFamily, Transformable,
    };

    // Inference
    pub use crate::inference::{
        ExplainerConfig, InferenceConfig, InferenceEngine, InferenceStats, Prediction,
    };

    // Explainability
    pub use crate::explainability::{
        AttributionProvider, AttributionResult, BackgroundPolicy, FeatureTable, LabeledRow,
        RawAttribution, TreeExplainer,
    };

    // Monitoring
    pub use crate::monitoring::PerformanceMetrics;
}
