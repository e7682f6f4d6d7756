//! Normalized attribution results

use super::RawAttribution;
use crate::error::{KolosalError, Result};
use crate::schema::TaskKind;
use ndarray::Array2;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Ordered mapping from a name to a value
///
/// Serializes as a JSON object whose keys keep their insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabeledRow {
    entries: Vec<(String, f64)>,
}

impl LabeledRow {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for LabeledRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Attributions keyed by feature name, one row per explained record
///
/// Regression results are a sequence of rows; classification results map
/// each class label, in class order, to such a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributionResult {
    Regression(Vec<LabeledRow>),
    Classification(Vec<(String, Vec<LabeledRow>)>),
}

impl AttributionResult {
    /// Rows for one class label
    pub fn class(&self, label: &str) -> Option<&[LabeledRow]> {
        match self {
            AttributionResult::Classification(classes) => classes
                .iter()
                .find(|(c, _)| c == label)
                .map(|(_, rows)| rows.as_slice()),
            AttributionResult::Regression(_) => None,
        }
    }

    /// Rows of a regression result
    pub fn records(&self) -> Option<&[LabeledRow]> {
        match self {
            AttributionResult::Regression(rows) => Some(rows),
            AttributionResult::Classification(_) => None,
        }
    }

    pub fn class_labels(&self) -> Vec<&str> {
        match self {
            AttributionResult::Classification(classes) => {
                classes.iter().map(|(c, _)| c.as_str()).collect()
            }
            AttributionResult::Regression(_) => Vec::new(),
        }
    }

    /// Shape raw provider output into named rows.
    ///
    /// A single array for a classifier is only accepted with exactly two
    /// classes; the first class receives its negation.
    pub fn from_raw(
        raw: RawAttribution,
        task: TaskKind,
        class_labels: &[String],
        feature_names: &[String],
        n_rows: usize,
    ) -> Result<Self> {
        let expected = (n_rows, feature_names.len());
        let check = |a: &Array2<f64>| -> Result<()> {
            if a.dim() != expected {
                return Err(KolosalError::Explain(format!(
                    "attribution array has shape {:?}, expected {:?}",
                    a.dim(),
                    expected
                )));
            }
            Ok(())
        };

        match task {
            TaskKind::Regression => {
                let values = match raw {
                    RawAttribution::Single(a) => a,
                    RawAttribution::PerClass(mut arrays) if arrays.len() == 1 => arrays.remove(0),
                    RawAttribution::PerClass(arrays) => {
                        return Err(KolosalError::Explain(format!(
                            "regression attribution returned {} output arrays",
                            arrays.len()
                        )))
                    }
                };
                check(&values)?;
                Ok(AttributionResult::Regression(label_rows(&values, feature_names)))
            }
            TaskKind::Classification => {
                let arrays = match raw {
                    RawAttribution::PerClass(arrays) if arrays.len() == class_labels.len() => arrays,
                    RawAttribution::PerClass(arrays) => {
                        return Err(KolosalError::Explain(format!(
                            "attribution returned {} class arrays for {} classes",
                            arrays.len(),
                            class_labels.len()
                        )))
                    }
                    RawAttribution::Single(a) if class_labels.len() == 2 => vec![-&a, a],
                    RawAttribution::Single(_) => {
                        return Err(KolosalError::Explain(format!(
                            "a single attribution array is only valid for two classes, model has {}",
                            class_labels.len()
                        )))
                    }
                };
                arrays.iter().try_for_each(check)?;
                Ok(AttributionResult::Classification(
                    class_labels
                        .iter()
                        .zip(&arrays)
                        .map(|(label, a)| (label.clone(), label_rows(a, feature_names)))
                        .collect(),
                ))
            }
        }
    }
}

fn label_rows(values: &Array2<f64>, feature_names: &[String]) -> Vec<LabeledRow> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            LabeledRow::new(
                feature_names
                    .iter()
                    .cloned()
                    .zip(row.iter().copied())
                    .collect(),
            )
        })
        .collect()
}

impl Serialize for AttributionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AttributionResult::Regression(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
            AttributionResult::Classification(classes) => {
                let mut map = serializer.serialize_map(Some(classes.len()))?;
                for (label, rows) in classes {
                    map.serialize_entry(label, rows)?;
                }
                map.end()
            }
        }
    }
}
