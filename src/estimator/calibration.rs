//! Fitted probability calibrators and the calibrated classifier wrapper

use super::Estimator;
use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// Fitted calibration mapping for one class probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibration {
    /// Sigmoid on the probability's logit: `sigmoid(a * logit(p) + b)`
    Platt { a: f64, b: f64 },
    /// Piecewise-linear map through fitted thresholds, clamped at both ends
    Isotonic { x: Vec<f64>, y: Vec<f64> },
}

impl Calibration {
    pub fn apply(&self, prob: f64) -> f64 {
        match self {
            Calibration::Platt { a, b } => {
                let f = if prob <= 0.0 {
                    -10.0
                } else if prob >= 1.0 {
                    10.0
                } else {
                    (prob / (1.0 - prob)).ln()
                };
                1.0 / (1.0 + (-(a * f + b)).exp())
            }
            Calibration::Isotonic { x, y } => interpolate(x, y, prob),
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            Calibration::Platt { a, b } if !a.is_finite() || !b.is_finite() => Err(
                KolosalError::InvalidModel("platt parameters must be finite".to_string()),
            ),
            Calibration::Isotonic { x, y } => {
                if x.is_empty() || x.len() != y.len() {
                    return Err(KolosalError::InvalidModel(format!(
                        "isotonic calibrator has {} thresholds and {} values",
                        x.len(),
                        y.len()
                    )));
                }
                if x.windows(2).any(|w| w[0] > w[1]) {
                    return Err(KolosalError::InvalidModel(
                        "isotonic thresholds must be sorted".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn interpolate(x_vals: &[f64], y_vals: &[f64], x: f64) -> f64 {
    let last = x_vals.len() - 1;
    if x <= x_vals[0] {
        return y_vals[0];
    }
    if x >= x_vals[last] {
        return y_vals[last];
    }

    let mut lo = 0;
    let mut hi = last;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if x_vals[mid] <= x {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let (x0, x1, y0, y1) = (x_vals[lo], x_vals[hi], y_vals[lo], y_vals[hi]);
    if (x1 - x0).abs() < 1e-10 {
        return (y0 + y1) / 2.0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Classifier whose probabilities are post-processed by fitted calibrators
///
/// A binary classifier carries one calibrator for the positive class; a
/// multi-class classifier carries one per class and its calibrated
/// probabilities are renormalized to sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedClassifier {
    pub base: Box<Estimator>,
    pub calibrators: Vec<Calibration>,
}

impl CalibratedClassifier {
    pub fn predict_proba(&self, table: &DataFrame) -> Result<Array2<f64>> {
        let raw = self.base.predict_proba(table)?;
        let n_classes = raw.ncols();

        if self.calibrators.len() == 1 && n_classes == 2 {
            let calibrator = &self.calibrators[0];
            let mut out = Array2::zeros(raw.raw_dim());
            for (i, row) in raw.axis_iter(Axis(0)).enumerate() {
                let p = calibrator.apply(row[1]).clamp(0.0, 1.0);
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            }
            return Ok(out);
        }

        if self.calibrators.len() != n_classes {
            return Err(KolosalError::InvalidModel(format!(
                "{} calibrators for {} classes",
                self.calibrators.len(),
                n_classes
            )));
        }

        let mut out = Array2::zeros(raw.raw_dim());
        for (i, row) in raw.axis_iter(Axis(0)).enumerate() {
            let calibrated: Array1<f64> = row
                .iter()
                .zip(&self.calibrators)
                .map(|(p, c)| c.apply(*p).max(0.0))
                .collect();
            let total = calibrated.sum();
            for j in 0..n_classes {
                out[[i, j]] = if total > 0.0 {
                    calibrated[j] / total
                } else {
                    1.0 / n_classes as f64
                };
            }
        }
        Ok(out)
    }

    pub fn check(&self) -> Result<()> {
        self.base.check()?;
        if self.calibrators.is_empty() {
            return Err(KolosalError::InvalidModel(
                "calibrated classifier has no calibrators".to_string(),
            ));
        }
        for calibrator in &self.calibrators {
            calibrator.check()?;
        }
        Ok(())
    }
}
