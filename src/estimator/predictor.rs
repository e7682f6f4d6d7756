//! Base predictor families
//!
//! The family of a base predictor is an explicit tag in the serialized
//! artifact, resolved once when the artifact is loaded.

use super::linear::LinearModel;
use super::tree::Tree;
use crate::error::{KolosalError, Result};
use crate::schema::table_to_matrix;
use ndarray::Array2;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output link of a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Single continuous output, identity link
    Regression,
    /// Outputs are already class probabilities (tree and forest classifiers)
    ClassProbability,
    /// Single logit for the positive class
    BinaryLogistic,
    /// One margin per class, softmax link
    MultiSoftmax,
}

impl Objective {
    pub fn is_classification(&self) -> bool {
        !matches!(self, Objective::Regression)
    }

    /// Number of classes implied by `n_outputs` raw outputs
    pub fn n_classes(&self, n_outputs: usize) -> usize {
        match self {
            Objective::Regression => 0,
            Objective::BinaryLogistic => 2,
            Objective::ClassProbability | Objective::MultiSoftmax => n_outputs,
        }
    }

    /// Map raw outputs to class probabilities (identity for regression)
    pub fn link(&self, raw: &[f64]) -> Vec<f64> {
        match self {
            Objective::Regression => raw.to_vec(),
            Objective::ClassProbability => {
                let total: f64 = raw.iter().sum();
                if total > 0.0 {
                    raw.iter().map(|p| p / total).collect()
                } else {
                    vec![1.0 / raw.len() as f64; raw.len()]
                }
            }
            Objective::BinaryLogistic => {
                let p = sigmoid(raw[0]);
                vec![1.0 - p, p]
            }
            Objective::MultiSoftmax => softmax(raw),
        }
    }

    fn check_outputs(&self, n_outputs: usize) -> Result<()> {
        let ok = match self {
            Objective::Regression | Objective::BinaryLogistic => n_outputs == 1,
            Objective::ClassProbability | Objective::MultiSoftmax => n_outputs >= 2,
        };
        if ok {
            Ok(())
        } else {
            Err(KolosalError::InvalidModel(format!(
                "objective {:?} cannot produce {} outputs",
                self, n_outputs
            )))
        }
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// How per-tree outputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Boosted ensembles add tree outputs
    #[default]
    Sum,
    /// Forests average tree outputs
    Mean,
}

/// Fitted tree ensemble shared by every tree-based family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    /// Feature order the trees' `feature_idx` refer to
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub objective: Objective,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Added to the aggregated output, one entry per output (empty means zero)
    #[serde(default)]
    pub base_score: Vec<f64>,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn n_outputs(&self) -> usize {
        self.trees.first().map(|t| t.leaf_arity()).unwrap_or(0)
    }

    /// Aggregated raw output (margin) for one sample
    pub fn raw_row(&self, sample: &[f64]) -> Vec<f64> {
        let n_outputs = self.n_outputs();
        let mut out = vec![0.0; n_outputs];
        for tree in &self.trees {
            for (o, v) in out.iter_mut().zip(tree.predict_row(sample)) {
                *o += v;
            }
        }
        self.finish(&mut out);
        out
    }

    /// Expected raw output over the training distribution (cover-weighted)
    pub fn expected_value(&self) -> Vec<f64> {
        let n_outputs = self.n_outputs();
        let mut out = vec![0.0; n_outputs];
        for tree in &self.trees {
            for (o, v) in out.iter_mut().zip(tree.expected_value(n_outputs)) {
                *o += v;
            }
        }
        self.finish(&mut out);
        out
    }

    /// Scale factor applied to per-tree contributions
    pub fn tree_weight(&self) -> f64 {
        match self.aggregation {
            Aggregation::Sum => 1.0,
            Aggregation::Mean => 1.0 / self.trees.len().max(1) as f64,
        }
    }

    fn finish(&self, out: &mut [f64]) {
        let weight = self.tree_weight();
        for (i, o) in out.iter_mut().enumerate() {
            *o = *o * weight + self.base_score.get(i).copied().unwrap_or(0.0);
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(KolosalError::InvalidModel("tree ensemble has no trees".to_string()));
        }
        let n_outputs = self.n_outputs();
        self.objective.check_outputs(n_outputs)?;
        for tree in &self.trees {
            tree.check(self.feature_names.len(), n_outputs)?;
        }
        if !self.base_score.is_empty() && self.base_score.len() != n_outputs {
            return Err(KolosalError::InvalidModel(format!(
                "base_score has {} entries, expected {}",
                self.base_score.len(),
                n_outputs
            )));
        }
        Ok(())
    }
}

/// Tag identifying a base predictor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictorFamily {
    DecisionTree,
    RandomForest,
    GradientBoosting,
    XGBoost,
    LightGBM,
    CatBoost,
    Linear,
}

impl PredictorFamily {
    /// Tree-based families supported by the attribution engine
    pub fn is_explainable(&self) -> bool {
        !matches!(self, PredictorFamily::Linear)
    }

    /// Families whose feature indices follow their own named feature order,
    /// so attribution input must keep column names instead of positions
    pub fn requires_named_columns(&self) -> bool {
        matches!(self, PredictorFamily::LightGBM)
    }
}

impl fmt::Display for PredictorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredictorFamily::DecisionTree => "decision_tree",
            PredictorFamily::RandomForest => "random_forest",
            PredictorFamily::GradientBoosting => "gradient_boosting",
            PredictorFamily::XGBoost => "xgboost",
            PredictorFamily::LightGBM => "lightgbm",
            PredictorFamily::CatBoost => "catboost",
            PredictorFamily::Linear => "linear",
        };
        write!(f, "{}", name)
    }
}

/// The innermost fitted estimator, tagged by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum BasePredictor {
    DecisionTree(TreeEnsemble),
    RandomForest(TreeEnsemble),
    GradientBoosting(TreeEnsemble),
    #[serde(rename = "xgboost")]
    XGBoost(TreeEnsemble),
    #[serde(rename = "lightgbm")]
    LightGBM(TreeEnsemble),
    #[serde(rename = "catboost")]
    CatBoost(TreeEnsemble),
    Linear(LinearModel),
}

impl BasePredictor {
    pub fn family(&self) -> PredictorFamily {
        match self {
            BasePredictor::DecisionTree(_) => PredictorFamily::DecisionTree,
            BasePredictor::RandomForest(_) => PredictorFamily::RandomForest,
            BasePredictor::GradientBoosting(_) => PredictorFamily::GradientBoosting,
            BasePredictor::XGBoost(_) => PredictorFamily::XGBoost,
            BasePredictor::LightGBM(_) => PredictorFamily::LightGBM,
            BasePredictor::CatBoost(_) => PredictorFamily::CatBoost,
            BasePredictor::Linear(_) => PredictorFamily::Linear,
        }
    }

    /// The tree ensemble behind a tree-based family
    pub fn tree_ensemble(&self) -> Option<&TreeEnsemble> {
        match self {
            BasePredictor::DecisionTree(m)
            | BasePredictor::RandomForest(m)
            | BasePredictor::GradientBoosting(m)
            | BasePredictor::XGBoost(m)
            | BasePredictor::LightGBM(m)
            | BasePredictor::CatBoost(m) => Some(m),
            BasePredictor::Linear(_) => None,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        match self {
            BasePredictor::Linear(m) => &m.feature_names,
            _ => self.tree_ensemble().map(|m| m.feature_names.as_slice()).unwrap_or(&[]),
        }
    }

    /// The predictor's own class list, in output order
    pub fn classes(&self) -> &[String] {
        match self {
            BasePredictor::Linear(m) => &m.classes,
            _ => self.tree_ensemble().map(|m| m.classes.as_slice()).unwrap_or(&[]),
        }
    }

    pub fn objective(&self) -> Objective {
        match self {
            BasePredictor::Linear(m) => m.objective,
            _ => self
                .tree_ensemble()
                .map(|m| m.objective)
                .unwrap_or(Objective::Regression),
        }
    }

    pub fn n_outputs(&self) -> usize {
        match self {
            BasePredictor::Linear(m) => m.n_outputs(),
            _ => self.tree_ensemble().map(|m| m.n_outputs()).unwrap_or(0),
        }
    }

    pub fn n_classes(&self) -> usize {
        self.objective().n_classes(self.n_outputs())
    }

    /// Raw outputs for one sample laid out in the predictor's feature order
    pub fn raw_row(&self, sample: &[f64]) -> Vec<f64> {
        match self {
            BasePredictor::Linear(m) => m.raw_row(sample),
            _ => self
                .tree_ensemble()
                .map(|m| m.raw_row(sample))
                .unwrap_or_default(),
        }
    }

    /// Raw outputs for every row of a table, columns selected by name
    pub fn predict_raw(&self, table: &DataFrame) -> Result<Array2<f64>> {
        let x = table_to_matrix(table, self.feature_names())?;
        let n_outputs = self.n_outputs();
        let mut out = Array2::zeros((x.nrows(), n_outputs));
        for (i, row) in x.rows().into_iter().enumerate() {
            let sample = row.to_vec();
            for (j, v) in self.raw_row(&sample).into_iter().enumerate() {
                out[[i, j]] = v;
            }
        }
        Ok(out)
    }

    /// Class probabilities for every row of a table
    pub fn predict_proba(&self, table: &DataFrame) -> Result<Array2<f64>> {
        let objective = self.objective();
        if !objective.is_classification() {
            return Err(KolosalError::UnsupportedTask {
                operation: "predict_proba".to_string(),
                task: "regression".to_string(),
            });
        }
        let raw = self.predict_raw(table)?;
        let n_classes = self.n_classes();
        let mut proba = Array2::zeros((raw.nrows(), n_classes));
        for (i, row) in raw.rows().into_iter().enumerate() {
            for (j, p) in objective.link(&row.to_vec()).into_iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    pub fn check(&self) -> Result<()> {
        if self.feature_names().is_empty() {
            return Err(KolosalError::InvalidModel(format!(
                "{} predictor declares no feature names",
                self.family()
            )));
        }
        match self {
            BasePredictor::Linear(m) => m.check()?,
            _ => {
                if let Some(m) = self.tree_ensemble() {
                    m.check()?;
                }
            }
        }
        match (self, self.tree_ensemble().map(|m| m.aggregation)) {
            (BasePredictor::RandomForest(_), Some(Aggregation::Sum)) => {
                return Err(KolosalError::InvalidModel(
                    "random forests must average their trees".to_string(),
                ))
            }
            (
                BasePredictor::GradientBoosting(_)
                | BasePredictor::XGBoost(_)
                | BasePredictor::LightGBM(_)
                | BasePredictor::CatBoost(_),
                Some(Aggregation::Mean),
            ) => {
                return Err(KolosalError::InvalidModel(format!(
                    "{} ensembles must sum their trees",
                    self.family()
                )))
            }
            _ => {}
        }
        let classes = self.classes();
        if !classes.is_empty() && classes.len() != self.n_classes() {
            return Err(KolosalError::InvalidModel(format!(
                "predictor lists {} classes but produces {}",
                classes.len(),
                self.n_classes()
            )));
        }
        Ok(())
    }
}
