//! Fitted linear models

use super::Objective;
use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};

/// Linear model: one coefficient row and intercept per output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub objective: Objective,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    pub fn n_outputs(&self) -> usize {
        self.coefficients.len()
    }

    /// Raw margins for one sample
    pub fn raw_row(&self, sample: &[f64]) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(coef, intercept)| {
                intercept + coef.iter().zip(sample).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect()
    }

    pub fn check(&self) -> Result<()> {
        if self.objective == Objective::ClassProbability {
            return Err(KolosalError::InvalidModel(
                "linear models produce margins, not class probabilities".to_string(),
            ));
        }
        if self.coefficients.is_empty() {
            return Err(KolosalError::InvalidModel(
                "linear model has no coefficients".to_string(),
            ));
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err(KolosalError::InvalidModel(format!(
                "linear model has {} coefficient rows but {} intercepts",
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        let n_features = self.feature_names.len();
        if let Some(row) = self.coefficients.iter().find(|row| row.len() != n_features) {
            return Err(KolosalError::InvalidModel(format!(
                "coefficient row has {} entries, expected {}",
                row.len(),
                n_features
            )));
        }
        Ok(())
    }
}
