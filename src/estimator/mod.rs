//! Fitted estimators: pipelines, calibrated wrappers and base predictors
//!
//! An [`Estimator`] is the serialized model envelope. Pipelines and
//! calibration wrappers may nest arbitrarily; [`resolve_base_predictor`]
//! peels them off to reach the innermost [`BasePredictor`].

mod calibration;
mod linear;
mod predictor;
mod transforms;
mod tree;

pub use calibration::{CalibratedClassifier, Calibration};
pub use linear::LinearModel;
pub use predictor::{Aggregation, BasePredictor, Objective, PredictorFamily, TreeEnsemble};
pub use transforms::{ColumnTransform, FillValue, ScaleParams};
pub use tree::{goes_left, Tree, TreeNode};

pub(crate) use predictor::sigmoid;

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// Capability of mapping validated input to the predictor's input space
pub trait Transformable {
    fn transform(&self, table: &DataFrame) -> Result<DataFrame>;
}

/// Named pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub step: Step,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Transform(ColumnTransform),
    Estimator(Box<Estimator>),
}

/// Ordered transforms ending in an estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// The estimator in the final step
    pub fn final_estimator(&self) -> Result<&Estimator> {
        match self.steps.last().map(|s| &s.step) {
            Some(Step::Estimator(estimator)) => Ok(estimator),
            Some(Step::Transform(_)) => Err(KolosalError::InvalidModel(
                "pipeline must end with an estimator step".to_string(),
            )),
            None => Err(KolosalError::InvalidModel("pipeline has no steps".to_string())),
        }
    }

    fn transforms(&self) -> impl Iterator<Item = &ColumnTransform> {
        self.steps.iter().filter_map(|s| match &s.step {
            Step::Transform(t) => Some(t),
            Step::Estimator(_) => None,
        })
    }

    fn check(&self) -> Result<()> {
        let final_estimator = self.final_estimator()?;
        let head = &self.steps[..self.steps.len() - 1];
        for step in head {
            match &step.step {
                Step::Transform(t) => t.check()?,
                Step::Estimator(_) => {
                    return Err(KolosalError::InvalidModel(format!(
                        "pipeline step '{}' is an estimator but only the last step may be",
                        step.name
                    )))
                }
            }
        }
        final_estimator.check()
    }
}

impl Transformable for Pipeline {
    /// Apply every transform step, then the final estimator's own transforms
    fn transform(&self, table: &DataFrame) -> Result<DataFrame> {
        let mut current = table.clone();
        for transform in self.transforms() {
            current = transform.apply(&current)?;
        }
        match self.final_estimator()?.transformer() {
            Some(inner) => inner.transform(&current),
            None => Ok(current),
        }
    }
}

/// Serialized model envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Pipeline(Pipeline),
    Calibrated(CalibratedClassifier),
    Predictor(BasePredictor),
}

impl Estimator {
    /// The transformation capability, if this estimator has one
    pub fn transformer(&self) -> Option<&dyn Transformable> {
        match self {
            Estimator::Pipeline(p) => {
                let has_transform = p.transforms().next().is_some();
                let inner = p.final_estimator().ok().and_then(|e| e.transformer());
                if has_transform || inner.is_some() {
                    Some(p)
                } else {
                    None
                }
            }
            Estimator::Calibrated(c) => c.base.transformer(),
            Estimator::Predictor(_) => None,
        }
    }

    /// Apply the estimator's transforms, or return the table unchanged
    pub fn transform(&self, table: &DataFrame) -> Result<DataFrame> {
        match self.transformer() {
            Some(t) => t.transform(table),
            None => Ok(table.clone()),
        }
    }

    /// Class probabilities, one row per input row
    pub fn predict_proba(&self, table: &DataFrame) -> Result<Array2<f64>> {
        match self {
            Estimator::Pipeline(p) => {
                let mut current = table.clone();
                for transform in p.transforms() {
                    current = transform.apply(&current)?;
                }
                p.final_estimator()?.predict_proba(&current)
            }
            Estimator::Calibrated(c) => c.predict_proba(table),
            Estimator::Predictor(b) => b.predict_proba(table),
        }
    }

    /// Class indices for classifiers, values for regressors
    pub fn predict(&self, table: &DataFrame) -> Result<Array1<f64>> {
        let base = resolve_base_predictor(self)?;
        if base.objective().is_classification() {
            let proba = self.predict_proba(table)?;
            Ok(proba
                .axis_iter(Axis(0))
                .map(|row| argmax(row.iter().copied()) as f64)
                .collect())
        } else {
            let table = self.transform(table)?;
            let raw = base.predict_raw(&table)?;
            Ok(raw.column(0).to_owned())
        }
    }

    /// Structural validation of the whole estimator tree
    pub fn check(&self) -> Result<()> {
        match self {
            Estimator::Pipeline(p) => p.check(),
            Estimator::Calibrated(c) => {
                c.check()?;
                let base = resolve_base_predictor(&c.base)?;
                if !base.objective().is_classification() {
                    return Err(KolosalError::InvalidModel(
                        "calibration wraps a regressor".to_string(),
                    ));
                }
                let n_classes = base.n_classes();
                let n_calibrators = c.calibrators.len();
                if n_calibrators != n_classes && !(n_calibrators == 1 && n_classes == 2) {
                    return Err(KolosalError::InvalidModel(format!(
                        "{} calibrators for {} classes",
                        n_calibrators, n_classes
                    )));
                }
                Ok(())
            }
            Estimator::Predictor(b) => b.check(),
        }
    }
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_v), (i, v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}

/// Find the innermost fitted predictor behind pipelines and calibration wrappers
pub fn resolve_base_predictor(estimator: &Estimator) -> Result<&BasePredictor> {
    match estimator {
        Estimator::Pipeline(p) => resolve_base_predictor(p.final_estimator()?),
        Estimator::Calibrated(c) => resolve_base_predictor(&c.base),
        Estimator::Predictor(b) => Ok(b),
    }
}
