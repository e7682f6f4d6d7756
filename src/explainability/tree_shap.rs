//! Path-dependent TreeSHAP
//!
//! Exact Shapley values of a tree's raw output where a missing feature
//! follows both children weighted by their training cover. Runs in
//! O(leaves * depth^2) per tree and sample.

use crate::estimator::{goes_left, Tree, TreeNode};
use ndarray::Array2;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Add the attributions of one tree for one sample to `phi`
/// (`n_features x n_outputs`), scaled by `weight`
pub fn tree_shap(tree: &Tree, sample: &[f64], weight: f64, phi: &mut Array2<f64>) {
    let mut walker = Walker { sample, weight, phi };
    walker.recurse(&tree.root, &[], 1.0, 1.0, None);
}

struct Walker<'a> {
    sample: &'a [f64],
    weight: f64,
    phi: &'a mut Array2<f64>,
}

impl Walker<'_> {
    fn recurse(
        &mut self,
        node: &TreeNode,
        parent_path: &[PathElement],
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = parent_path.to_vec();
        extend(&mut path, zero_fraction, one_fraction, feature);

        match node {
            TreeNode::Leaf { value, .. } => {
                for i in 1..path.len() {
                    let element = path[i];
                    let Some(f) = element.feature else { continue };
                    let scale = unwound_sum(&path, i)
                        * (element.one_fraction - element.zero_fraction)
                        * self.weight;
                    for (o, v) in value.iter().enumerate() {
                        self.phi[[f, o]] += scale * v;
                    }
                }
            }
            TreeNode::Split { feature_idx, threshold, left, right, n_samples } => {
                let (hot, cold) = if goes_left(self.sample[*feature_idx], *threshold) {
                    (left, right)
                } else {
                    (right, left)
                };
                let cover = *n_samples as f64;
                let hot_zero = hot.n_samples() as f64 / cover;
                let cold_zero = cold.n_samples() as f64 / cover;

                // A feature already on the path is undone and re-extended
                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = path
                    .iter()
                    .skip(1)
                    .position(|e| e.feature == Some(*feature_idx))
                {
                    let k = k + 1;
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind(&mut path, k);
                }

                self.recurse(
                    hot,
                    &path,
                    hot_zero * incoming_zero,
                    incoming_one,
                    Some(*feature_idx),
                );
                self.recurse(cold, &path, cold_zero * incoming_zero, 0.0, Some(*feature_idx));
            }
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one);
            next_one_portion = tmp - path[i].pweight * zero * (depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `index` removed
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero * (depth - i) as f64 / denom;
        } else if zero != 0.0 {
            total += path[i].pweight / zero / ((depth - i) as f64 / denom);
        }
    }
    total
}
