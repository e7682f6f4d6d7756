//! Feature schema and request records
//!
//! Provides the metadata stored alongside a trained model:
//! - Declared features with their semantic kind (numeric, categorical)
//! - Task kind (classification, regression) and optional class names
//! - Request records (single mapping or batch of mappings)
//! - Feature validation into a schema-ordered table

mod table;
mod validator;

pub use table::table_to_matrix;
pub use validator::FeatureValidator;

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Semantic type of a declared feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Numeric => write!(f, "numeric"),
            FeatureKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// A single declared feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    /// Optional features may be absent or null in a record
    #[serde(default)]
    pub optional: bool,
    /// Allowed values for a categorical feature (unrestricted when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric,
            optional: false,
            categories: None,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
            optional: false,
            categories: None,
        }
    }

    /// Mark the feature as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Restrict a categorical feature to a fixed set of values
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }
}

/// Ordered list of declared features
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    /// Feature names in declared order
    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureSpec> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Check the schema is non-empty and free of duplicate names
    pub fn check(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(KolosalError::ConfigError(
                "feature schema declares no features".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.features {
            if !seen.insert(spec.name.as_str()) {
                return Err(KolosalError::ConfigError(format!(
                    "feature '{}' is declared more than once",
                    spec.name
                )));
            }
            if spec.categories.is_some() && spec.kind != FeatureKind::Categorical {
                return Err(KolosalError::ConfigError(format!(
                    "feature '{}' declares categories but is not categorical",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// Supervised learning task served by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Classification,
    Regression,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Classification => write!(f, "classification"),
            TaskKind::Regression => write!(f, "regression"),
        }
    }
}

/// Metadata stored with a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub features: FeatureSchema,
    pub task: TaskKind,
    /// Human-readable class names, in class-index order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_names: Option<Vec<String>>,
}

impl ModelMetadata {
    pub fn new(features: FeatureSchema, task: TaskKind) -> Self {
        Self {
            features,
            task,
            class_names: None,
        }
    }

    pub fn with_class_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.class_names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// A flat mapping from feature name to value
pub type Record = serde_json::Map<String, Value>;

/// One record or an ordered batch of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Records {
    Single(Record),
    Batch(Vec<Record>),
}

impl Records {
    /// View the records as a slice, a single record being a batch of one
    pub fn as_slice(&self) -> &[Record] {
        match self {
            Records::Single(record) => std::slice::from_ref(record),
            Records::Batch(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl From<Record> for Records {
    fn from(record: Record) -> Self {
        Records::Single(record)
    }
}

impl From<Vec<Record>> for Records {
    fn from(records: Vec<Record>) -> Self {
        Records::Batch(records)
    }
}

impl TryFrom<Value> for Records {
    type Error = KolosalError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(record) => Ok(Records::Single(record)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(KolosalError::InvalidInput(format!(
                        "record {} must be an object, got {}",
                        i,
                        json_type_name(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Records::Batch),
            other => Err(KolosalError::InvalidInput(format!(
                "expected a record or a list of records, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
