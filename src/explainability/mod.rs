//! Feature attribution
//!
//! The engine talks to attribution algorithms through the
//! [`AttributionProvider`] trait:
//! - [`TreeExplainer`] - built-in provider for tree ensembles
//!   (path-dependent TreeSHAP, interventional Shapley against a background)
//! - [`AttributionResult`] - raw provider output normalized into rows keyed
//!   by feature name, per class for classifiers

mod explainer;
mod interventional;
mod result;
mod tree_shap;

pub use explainer::TreeExplainer;
pub use interventional::{exact_shapley, sampled_shapley};
pub use result::{AttributionResult, LabeledRow};
pub use tree_shap::tree_shap;

use crate::error::Result;
use crate::estimator::BasePredictor;
use ndarray::Array2;
use polars::prelude::DataFrame;

/// Feature table handed to a provider
///
/// Families that index features by their own column names receive the
/// named table; the rest receive a dense matrix in schema order.
#[derive(Debug, Clone)]
pub enum FeatureTable {
    Named(DataFrame),
    Dense(Array2<f64>),
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        match self {
            FeatureTable::Named(df) => df.height(),
            FeatureTable::Dense(x) => x.nrows(),
        }
    }

    pub fn n_columns(&self) -> usize {
        match self {
            FeatureTable::Named(df) => df.width(),
            FeatureTable::Dense(x) => x.ncols(),
        }
    }

    /// Column names, when the table carries them
    pub fn column_names(&self) -> Option<Vec<String>> {
        match self {
            FeatureTable::Named(df) => Some(
                df.get_column_names()
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
            ),
            FeatureTable::Dense(_) => None,
        }
    }
}

/// Output space attributions are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOutput {
    /// Raw margin, before any link function
    Raw,
    /// Class probability (identity for regressors)
    Probability,
}

/// How absent features are integrated out
#[derive(Debug, Clone)]
pub enum BackgroundPolicy {
    /// Follow the training covers recorded along each tree path
    TreePathDependent,
    /// Use the given sample as an independent reference distribution
    Interventional(FeatureTable),
}

impl BackgroundPolicy {
    pub fn model_output(&self) -> ModelOutput {
        match self {
            BackgroundPolicy::TreePathDependent => ModelOutput::Raw,
            BackgroundPolicy::Interventional(_) => ModelOutput::Probability,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackgroundPolicy::TreePathDependent => "tree_path_dependent",
            BackgroundPolicy::Interventional(_) => "interventional",
        }
    }
}

/// Unnormalized provider output, each array `n_rows x n_features`
#[derive(Debug, Clone, PartialEq)]
pub enum RawAttribution {
    /// One array per class
    PerClass(Vec<Array2<f64>>),
    /// One array shared by the whole model (regression, or one side of a binary model)
    Single(Array2<f64>),
}

/// Computes per-record, per-feature attributions for a base predictor
pub trait AttributionProvider: Send + Sync {
    fn compute(
        &self,
        predictor: &BasePredictor,
        data: &FeatureTable,
        policy: &BackgroundPolicy,
    ) -> Result<RawAttribution>;
}
