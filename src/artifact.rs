//! Loaded model artifacts
//!
//! An artifact pairs a fitted [`Estimator`] with the [`ModelMetadata`] it was
//! trained against. It is validated once when built and read-only afterwards.

use crate::error::{KolosalError, Result};
use crate::estimator::{resolve_base_predictor, BasePredictor, Estimator, PredictorFamily};
use crate::schema::{FeatureSchema, ModelMetadata, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactFile {
    model: Estimator,
    metadata: ModelMetadata,
}

/// Fitted estimator plus its feature schema, task and class labels
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    estimator: Estimator,
    metadata: ModelMetadata,
    family: PredictorFamily,
    class_names: Option<Vec<String>>,
}

impl ModelArtifact {
    /// Validate an estimator against its metadata and resolve its base predictor family
    pub fn new(estimator: Estimator, metadata: ModelMetadata) -> Result<Self> {
        metadata.features.check()?;
        estimator.check()?;

        let base = resolve_base_predictor(&estimator)?;
        check_task(base, &metadata)?;
        check_feature_names(base, &metadata.features)?;
        let class_names = resolve_class_names(base, &metadata);

        let family = base.family();
        info!(
            family = %family,
            task = %metadata.task,
            features = metadata.features.len(),
            "Model artifact loaded"
        );

        Ok(Self {
            estimator,
            metadata,
            family,
            class_names,
        })
    }

    /// Parse an artifact from its JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(json)?;
        Self::new(file.model, file.metadata)
    }

    /// Read an artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading model artifact");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Serialize back to the JSON document format
    pub fn to_json(&self) -> Result<String> {
        let file = ArtifactFile {
            model: self.estimator.clone(),
            metadata: self.metadata.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.metadata.features
    }

    pub fn task(&self) -> TaskKind {
        self.metadata.task
    }

    /// Family of the base predictor, resolved at load time
    pub fn family(&self) -> PredictorFamily {
        self.family
    }

    pub fn base_predictor(&self) -> Result<&BasePredictor> {
        resolve_base_predictor(&self.estimator)
    }

    /// Feature names in schema order
    pub fn feature_names(&self) -> Vec<String> {
        self.metadata.features.names()
    }

    /// Class labels in output order, if the model or its metadata names them
    pub fn class_names(&self) -> Option<&[String]> {
        self.class_names.as_deref()
    }

    /// Number of classes (zero for regression)
    pub fn n_classes(&self) -> usize {
        self.base_predictor().map(|b| b.n_classes()).unwrap_or(0)
    }
}

fn check_task(base: &BasePredictor, metadata: &ModelMetadata) -> Result<()> {
    let is_classifier = base.objective().is_classification();
    match metadata.task {
        TaskKind::Regression if is_classifier => Err(KolosalError::InvalidModel(format!(
            "metadata declares regression but the {} predictor is a classifier",
            base.family()
        ))),
        TaskKind::Classification if !is_classifier => Err(KolosalError::InvalidModel(format!(
            "metadata declares classification but the {} predictor is a regressor",
            base.family()
        ))),
        TaskKind::Classification => {
            let n_classes = base.n_classes();
            if n_classes < 2 {
                return Err(KolosalError::InvalidModel(format!(
                    "classifier produces {} classes",
                    n_classes
                )));
            }
            match &metadata.class_names {
                Some(names) if names.len() != n_classes => Err(KolosalError::InvalidModel(format!(
                    "metadata lists {} class names but the model has {} classes",
                    names.len(),
                    n_classes
                ))),
                _ => Ok(()),
            }
        }
        TaskKind::Regression => Ok(()),
    }
}

fn check_feature_names(base: &BasePredictor, schema: &FeatureSchema) -> Result<()> {
    let expected = schema.names();
    let actual = base.feature_names();

    let matches = if base.family().requires_named_columns() {
        let expected: HashSet<&str> = expected.iter().map(String::as_str).collect();
        let actual_set: HashSet<&str> = actual.iter().map(String::as_str).collect();
        actual.len() == expected.len() && actual_set == expected
    } else {
        actual == expected.as_slice()
    };

    if matches {
        Ok(())
    } else {
        Err(KolosalError::InvalidModel(format!(
            "{} predictor features {:?} do not match the schema {:?}",
            base.family(),
            actual,
            expected
        )))
    }
}

/// The predictor's own classes win over metadata, since wrappers may relabel
fn resolve_class_names(base: &BasePredictor, metadata: &ModelMetadata) -> Option<Vec<String>> {
    if metadata.task != TaskKind::Classification {
        return None;
    }
    let own = base.classes();
    if !own.is_empty() {
        return Some(own.to_vec());
    }
    metadata.class_names.clone()
}
