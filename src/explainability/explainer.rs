//! Built-in attribution provider for tree ensembles

use super::interventional::{exact_shapley, sampled_shapley};
use super::tree_shap::tree_shap;
use super::{AttributionProvider, BackgroundPolicy, FeatureTable, RawAttribution};
use crate::error::{KolosalError, Result};
use crate::estimator::{sigmoid, BasePredictor, Objective, TreeEnsemble};
use crate::inference::ExplainerConfig;
use crate::schema::table_to_matrix;
use ndarray::{Array2, Axis};
use rand::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

/// SHAP values for decision trees, forests and boosted ensembles
///
/// Without a background the attributions are exact path-dependent TreeSHAP
/// values of the raw margin. With a background they are interventional
/// Shapley values of the probability output (identity for regressors),
/// exact up to `max_exact_features` features and sampled beyond.
#[derive(Debug, Clone, Default)]
pub struct TreeExplainer {
    config: ExplainerConfig,
}

impl TreeExplainer {
    pub fn new(config: ExplainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    fn path_dependent(&self, ensemble: &TreeEnsemble, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let n_features = ensemble.feature_names.len();
        let n_outputs = ensemble.n_outputs();
        let weight = ensemble.tree_weight();

        (0..x.nrows())
            .into_par_iter()
            .map(|r| {
                let sample = x.row(r).to_vec();
                let mut phi = Array2::zeros((n_features, n_outputs));
                for tree in &ensemble.trees {
                    tree_shap(tree, &sample, weight, &mut phi);
                }
                phi
            })
            .collect()
    }

    fn interventional(
        &self,
        ensemble: &TreeEnsemble,
        x: &Array2<f64>,
        background: &Array2<f64>,
    ) -> Vec<Array2<f64>> {
        let n_features = ensemble.feature_names.len();
        let n_outputs = probability_arity(ensemble);
        let output = |sample: &[f64]| probability_output(ensemble, sample);
        let exact = n_features <= self.config.max_exact_features;

        (0..x.nrows())
            .into_par_iter()
            .map(|r| {
                let instance = x.row(r);
                if exact {
                    exact_shapley(instance, background, n_outputs, output)
                } else {
                    let mut rng = match self.config.seed {
                        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(r as u64)),
                        None => StdRng::from_entropy(),
                    };
                    sampled_shapley(
                        instance,
                        background,
                        n_outputs,
                        self.config.n_permutations,
                        &mut rng,
                        output,
                    )
                }
            })
            .collect()
    }

    fn subsample(&self, background: Array2<f64>) -> Array2<f64> {
        let limit = match self.config.max_background_samples {
            Some(limit) if background.nrows() > limit => limit,
            _ => return background,
        };
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut indices = rand::seq::index::sample(&mut rng, background.nrows(), limit).into_vec();
        indices.sort_unstable();
        info!(
            from = background.nrows(),
            to = limit,
            "Subsampling background for attribution"
        );
        background.select(Axis(0), &indices)
    }
}

/// Number of outputs explained in probability space
fn probability_arity(ensemble: &TreeEnsemble) -> usize {
    match ensemble.objective {
        Objective::BinaryLogistic | Objective::Regression => 1,
        Objective::ClassProbability | Objective::MultiSoftmax => ensemble.n_outputs(),
    }
}

/// Binary logistic models are explained on the positive-class probability only
fn probability_output(ensemble: &TreeEnsemble, sample: &[f64]) -> Vec<f64> {
    let raw = ensemble.raw_row(sample);
    match ensemble.objective {
        Objective::BinaryLogistic => vec![sigmoid(raw[0])],
        objective => objective.link(&raw),
    }
}

/// Lay a table out in the ensemble's feature order.
///
/// Returns the matrix plus, for each input column, its index in that order.
fn align(ensemble: &TreeEnsemble, table: &FeatureTable) -> Result<(Array2<f64>, Vec<usize>)> {
    let model_names = &ensemble.feature_names;
    match table {
        FeatureTable::Named(df) => {
            let columns = table.column_names().unwrap_or_default();
            if columns.len() != model_names.len() {
                return Err(KolosalError::ShapeError {
                    expected: format!("{} columns", model_names.len()),
                    actual: format!("{} columns", columns.len()),
                });
            }
            let column_map = columns
                .iter()
                .map(|name| {
                    model_names.iter().position(|m| m == name).ok_or_else(|| {
                        KolosalError::DataError(format!(
                            "column '{}' is not a feature of the model",
                            name
                        ))
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            Ok((table_to_matrix(df, model_names)?, column_map))
        }
        FeatureTable::Dense(x) => {
            if x.ncols() != model_names.len() {
                return Err(KolosalError::ShapeError {
                    expected: format!("{} columns", model_names.len()),
                    actual: format!("{} columns", x.ncols()),
                });
            }
            Ok((x.clone(), (0..x.ncols()).collect()))
        }
    }
}

impl AttributionProvider for TreeExplainer {
    fn compute(
        &self,
        predictor: &BasePredictor,
        data: &FeatureTable,
        policy: &BackgroundPolicy,
    ) -> Result<RawAttribution> {
        self.config.validate()?;
        let ensemble = predictor
            .tree_ensemble()
            .ok_or_else(|| KolosalError::UnsupportedModel(predictor.family().to_string()))?;

        let (x, column_map) = align(ensemble, data)?;
        debug!(
            family = %predictor.family(),
            rows = x.nrows(),
            features = x.ncols(),
            policy = policy.name(),
            "Computing tree attributions"
        );

        let (per_row, n_outputs) = match policy {
            BackgroundPolicy::TreePathDependent => {
                (self.path_dependent(ensemble, &x), ensemble.n_outputs())
            }
            BackgroundPolicy::Interventional(background) => {
                if background.n_rows() == 0 {
                    return Err(KolosalError::InvalidInput(
                        "background sample is empty".to_string(),
                    ));
                }
                let (bg, _) = align(ensemble, background)?;
                let bg = self.subsample(bg);
                (self.interventional(ensemble, &x, &bg), probability_arity(ensemble))
            }
        };

        let mut outputs: Vec<Array2<f64>> = (0..n_outputs)
            .map(|o| {
                Array2::from_shape_fn((x.nrows(), column_map.len()), |(r, j)| {
                    per_row[r][[column_map[j], o]]
                })
            })
            .collect();

        if n_outputs == 1 {
            Ok(RawAttribution::Single(outputs.remove(0)))
        } else {
            Ok(RawAttribution::PerClass(outputs))
        }
    }
}
