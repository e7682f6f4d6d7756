//! Inference engine implementation
//!
//! Serves a loaded [`ModelArtifact`]:
//! - readiness gating (every operation fails with `NotReady` before load)
//! - schema validation of incoming records
//! - prediction, class probabilities and feature attributions
//! - latency tracking via PerformanceMetrics

use super::InferenceConfig;
use crate::artifact::ModelArtifact;
use crate::error::{KolosalError, Result};
use crate::estimator::BasePredictor;
use crate::explainability::{
    AttributionProvider, AttributionResult, BackgroundPolicy, FeatureTable, LabeledRow,
    TreeExplainer,
};
use crate::monitoring::PerformanceMetrics;
use crate::schema::{table_to_matrix, FeatureValidator, Records, TaskKind};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Inference statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceStats {
    pub total_requests: u64,
    pub total_records: u64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub throughput_per_sec: f64,
    pub error_count: u64,
}

/// One prediction per record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    /// Declared class label
    Label(String),
    /// Class index, when the model names no classes
    Class(i64),
    /// Regression output
    Value(f64),
}

/// Prediction and explanation engine over one model artifact
pub struct InferenceEngine {
    config: InferenceConfig,
    artifact: Option<Arc<ModelArtifact>>,
    provider: Arc<dyn AttributionProvider>,
    metrics: Arc<PerformanceMetrics>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("config", &self.config)
            .field("is_loaded", &self.is_loaded())
            .field("family", &self.artifact.as_ref().map(|a| a.family()))
            .finish()
    }
}

impl InferenceEngine {
    /// Create an engine with no model loaded
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            provider: Arc::new(TreeExplainer::new(config.explainer.clone())),
            metrics: Arc::new(PerformanceMetrics::new(config.metrics_window)),
            artifact: None,
            config,
        }
    }

    /// Serve the given artifact
    pub fn with_artifact(mut self, artifact: ModelArtifact) -> Self {
        self.load_artifact(artifact);
        self
    }

    /// Replace the attribution provider
    pub fn with_provider(mut self, provider: impl AttributionProvider + 'static) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    /// Validate the configuration and load an artifact from disk
    pub fn load(config: InferenceConfig, artifact_path: impl AsRef<Path>) -> Result<Self> {
        config.validate()?;
        let artifact = ModelArtifact::load(artifact_path)?;
        Ok(Self::new(config).with_artifact(artifact))
    }

    /// Swap in a new artifact; requests already running keep the previous one
    pub fn load_artifact(&mut self, artifact: ModelArtifact) {
        info!(family = %artifact.family(), task = %artifact.task(), "Engine ready");
        self.artifact = Some(Arc::new(artifact));
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn performance_metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Get inference statistics snapshot
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_requests: self.metrics.total_requests(),
            total_records: self.metrics.total_items(),
            avg_latency_ms: self.metrics.avg_latency(),
            p50_latency_ms: self.metrics.p50_latency(),
            p95_latency_ms: self.metrics.p95_latency(),
            p99_latency_ms: self.metrics.p99_latency(),
            throughput_per_sec: self.metrics.throughput(),
            error_count: self.metrics.total_errors(),
        }
    }

    /// The loaded artifact
    pub fn artifact(&self) -> Result<&ModelArtifact> {
        self.artifact.as_deref().ok_or_else(|| {
            warn!("Operation rejected: no model artifact loaded");
            KolosalError::NotReady
        })
    }

    /// Feature names in schema order
    pub fn feature_names(&self) -> Result<Vec<String>> {
        Ok(self.artifact()?.feature_names())
    }

    /// Class labels in output order
    pub fn class_names(&self) -> Result<Vec<String>> {
        let artifact = self.artifact()?;
        require_classification(artifact, "class_names")?;
        Ok(class_labels(artifact))
    }

    pub fn base_predictor(&self) -> Result<&BasePredictor> {
        self.artifact()?.base_predictor()
    }

    /// Validate records and apply the model's transforms, if it has any
    pub fn preprocess(&self, records: &Records) -> Result<DataFrame> {
        let start = Instant::now();
        let result = self
            .artifact()
            .and_then(|artifact| prepare(artifact, records))
            .map(|table| {
                let n = table.height();
                (table, n)
            });
        self.track(start, result)
    }

    /// One label or value per record
    pub fn predict(&self, records: &Records) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let result = self.artifact().and_then(|artifact| {
            let table = FeatureValidator::new(artifact.schema()).validate(records)?;
            let raw = artifact.estimator().predict(&table)?;

            let predictions: Vec<Prediction> = match artifact.task() {
                TaskKind::Regression => raw.iter().map(|v| Prediction::Value(*v)).collect(),
                TaskKind::Classification => {
                    let names = artifact.class_names();
                    raw.iter()
                        .map(|v| {
                            let index = *v as usize;
                            match names.and_then(|n| n.get(index)) {
                                Some(label) => Prediction::Label(label.clone()),
                                None => Prediction::Class(index as i64),
                            }
                        })
                        .collect()
                }
            };
            let n = predictions.len();
            Ok((predictions, n))
        });
        self.track(start, result)
    }

    /// One class-label-to-probability row per record
    pub fn predict_proba(&self, records: &Records) -> Result<Vec<LabeledRow>> {
        let start = Instant::now();
        let result = self.artifact().and_then(|artifact| {
            require_classification(artifact, "predict_proba")?;
            let table = FeatureValidator::new(artifact.schema()).validate(records)?;
            let proba = artifact.estimator().predict_proba(&table)?;

            let labels = class_labels(artifact);
            if proba.ncols() != labels.len() {
                return Err(KolosalError::ShapeError {
                    expected: format!("{} probability columns", labels.len()),
                    actual: format!("{} columns", proba.ncols()),
                });
            }
            let rows: Vec<LabeledRow> = proba
                .rows()
                .into_iter()
                .map(|row| LabeledRow::new(labels.iter().cloned().zip(row.iter().copied()).collect()))
                .collect();
            let n = rows.len();
            Ok((rows, n))
        });
        self.track(start, result)
    }

    /// Per-feature attributions for each record.
    ///
    /// Without a background the attributions are in raw model output units
    /// and follow the training paths; with one they are in probability units
    /// against the background as reference distribution.
    pub fn explain(
        &self,
        records: &Records,
        background: Option<&Records>,
    ) -> Result<AttributionResult> {
        let start = Instant::now();
        let result = self.artifact().and_then(|artifact| {
            let attribution = self.explain_with(artifact, records, background)?;
            let n = match &attribution {
                AttributionResult::Regression(rows) => rows.len(),
                AttributionResult::Classification(classes) => {
                    classes.first().map(|(_, rows)| rows.len()).unwrap_or(0)
                }
            };
            Ok((attribution, n))
        });
        self.track(start, result)
    }

    fn explain_with(
        &self,
        artifact: &ModelArtifact,
        records: &Records,
        background: Option<&Records>,
    ) -> Result<AttributionResult> {
        let predictor = artifact.base_predictor()?;
        let family = predictor.family();
        if !family.is_explainable() {
            return Err(KolosalError::UnsupportedModel(family.to_string()));
        }

        let data = prepare(artifact, records)?;
        let policy = match background {
            None => BackgroundPolicy::TreePathDependent,
            Some(bg) => {
                let bg = prepare(artifact, bg)?;
                BackgroundPolicy::Interventional(feature_table(artifact, &bg)?)
            }
        };
        info!(
            family = %family,
            rows = data.height(),
            policy = policy.name(),
            "Explaining records"
        );

        let table = feature_table(artifact, &data)?;
        let raw = self.provider.compute(predictor, &table, &policy)?;

        let labels = match artifact.task() {
            TaskKind::Classification => class_labels(artifact),
            TaskKind::Regression => Vec::new(),
        };
        AttributionResult::from_raw(
            raw,
            artifact.task(),
            &labels,
            &artifact.feature_names(),
            data.height(),
        )
    }

    fn track<T>(&self, start: Instant, result: Result<(T, usize)>) -> Result<T> {
        match result {
            Ok((value, items)) => {
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                self.metrics.record_request(latency_ms, items as u64);
                Ok(value)
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }
}

fn prepare(artifact: &ModelArtifact, records: &Records) -> Result<DataFrame> {
    let table = FeatureValidator::new(artifact.schema()).validate(records)?;
    artifact.estimator().transform(&table)
}

/// Named families get the table itself, the rest a dense matrix in schema order
fn feature_table(artifact: &ModelArtifact, table: &DataFrame) -> Result<FeatureTable> {
    let names = artifact.feature_names();
    if artifact.family().requires_named_columns() {
        Ok(FeatureTable::Named(table.select(names)?))
    } else {
        Ok(FeatureTable::Dense(table_to_matrix(table, &names)?))
    }
}

fn require_classification(artifact: &ModelArtifact, operation: &str) -> Result<()> {
    match artifact.task() {
        TaskKind::Classification => Ok(()),
        task => Err(KolosalError::UnsupportedTask {
            operation: operation.to_string(),
            task: task.to_string(),
        }),
    }
}

/// Declared class names, or the class indices as strings
fn class_labels(artifact: &ModelArtifact) -> Vec<String> {
    match artifact.class_names() {
        Some(names) => names.to_vec(),
        None => (0..artifact.n_classes()).map(|i| i.to_string()).collect(),
    }
}
