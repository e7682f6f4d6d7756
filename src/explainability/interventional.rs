//! Interventional Shapley values against a background sample
//!
//! The value of a coalition is the mean model output over background rows
//! with the coalition's features replaced by the explained instance's values.

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;

/// Exact Shapley values by enumerating every feature subset.
///
/// Returns an `n_features x n_outputs` array. Cost grows as `2^n_features`
/// times the background size, so callers cap the feature count.
pub fn exact_shapley<F>(
    instance: ArrayView1<'_, f64>,
    background: &Array2<f64>,
    n_outputs: usize,
    output: F,
) -> Array2<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n_features = instance.len();
    let n_subsets = 1usize << n_features;

    let mut values = Array2::<f64>::zeros((n_subsets, n_outputs));
    let mut hybrid = vec![0.0; n_features];
    for mask in 0..n_subsets {
        let mut acc = Array1::<f64>::zeros(n_outputs);
        for bg in background.rows() {
            for (j, h) in hybrid.iter_mut().enumerate() {
                *h = if mask & (1 << j) != 0 { instance[j] } else { bg[j] };
            }
            for (a, v) in acc.iter_mut().zip(output(&hybrid)) {
                *a += v;
            }
        }
        acc /= background.nrows() as f64;
        values.row_mut(mask).assign(&acc);
    }

    // |S|! (M - |S| - 1)! / M!
    let weights: Vec<f64> = (0..n_features)
        .map(|s| 1.0 / (n_features as f64 * binomial(n_features - 1, s)))
        .collect();

    let mut phi = Array2::zeros((n_features, n_outputs));
    for mask in 0..n_subsets {
        let size = mask.count_ones() as usize;
        if size == n_features {
            continue;
        }
        let weight = weights[size];
        for i in (0..n_features).filter(|i| mask & (1 << i) == 0) {
            let with = values.row(mask | (1 << i));
            let without = values.row(mask);
            for o in 0..n_outputs {
                phi[[i, o]] += weight * (with[o] - without[o]);
            }
        }
    }
    phi
}

/// Shapley values estimated from random feature permutations, one random
/// background row per permutation
pub fn sampled_shapley<F>(
    instance: ArrayView1<'_, f64>,
    background: &Array2<f64>,
    n_outputs: usize,
    n_permutations: usize,
    rng: &mut StdRng,
    output: F,
) -> Array2<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n_features = instance.len();
    let mut phi = Array2::zeros((n_features, n_outputs));
    let mut perm: Vec<usize> = (0..n_features).collect();

    for _ in 0..n_permutations {
        perm.shuffle(rng);
        let bg_idx = rng.gen_range(0..background.nrows());
        let mut x = background.row(bg_idx).to_vec();
        let mut before = output(&x);

        for &feature_idx in &perm {
            x[feature_idx] = instance[feature_idx];
            let after = output(&x);
            for o in 0..n_outputs {
                phi[[feature_idx, o]] += after[o] - before[o];
            }
            before = after;
        }
    }

    phi /= n_permutations.max(1) as f64;
    phi
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}
