//! Fitted decision tree structure

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};

/// Decision tree node
///
/// Every node records the number of training samples that reached it
/// (its cover). Leaves hold one value per model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Leaf node with per-output values
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node: `x[feature_idx] <= threshold` goes left, everything else
    /// (including NaN) goes right
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    pub fn leaf(value: Vec<f64>, n_samples: usize) -> Self {
        TreeNode::Leaf { value, n_samples }
    }

    pub fn split(
        feature_idx: usize,
        threshold: f64,
        left: TreeNode,
        right: TreeNode,
    ) -> Self {
        let n_samples = left.n_samples() + right.n_samples();
        TreeNode::Split {
            feature_idx,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
            n_samples,
        }
    }

    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }
}

/// Routing rule shared by prediction and attribution
#[inline]
pub fn goes_left(value: f64, threshold: f64) -> bool {
    value <= threshold
}

/// A single fitted tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub root: TreeNode,
}

impl Tree {
    pub fn new(root: TreeNode) -> Self {
        Self { root }
    }

    /// Leaf values reached by a sample
    pub fn predict_row(&self, sample: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if goes_left(sample[*feature_idx], *threshold) {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Cover-weighted mean of the leaf values
    pub fn expected_value(&self, n_outputs: usize) -> Vec<f64> {
        let mut acc = vec![0.0; n_outputs];
        let total = self.root.n_samples() as f64;
        if total > 0.0 {
            Self::accumulate_leaves(&self.root, total, &mut acc);
        }
        acc
    }

    fn accumulate_leaves(node: &TreeNode, total: f64, acc: &mut [f64]) {
        match node {
            TreeNode::Leaf { value, n_samples } => {
                let weight = *n_samples as f64 / total;
                for (a, v) in acc.iter_mut().zip(value) {
                    *a += weight * v;
                }
            }
            TreeNode::Split { left, right, .. } => {
                Self::accumulate_leaves(left, total, acc);
                Self::accumulate_leaves(right, total, acc);
            }
        }
    }

    /// Get tree depth
    pub fn depth(&self) -> usize {
        Self::node_depth(&self.root)
    }

    fn node_depth(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                1 + Self::node_depth(left).max(Self::node_depth(right))
            }
        }
    }

    /// Get number of leaves
    pub fn n_leaves(&self) -> usize {
        Self::count_leaves(&self.root)
    }

    fn count_leaves(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                Self::count_leaves(left) + Self::count_leaves(right)
            }
        }
    }

    /// Check split features are in range, covers are positive and consistent, and every leaf
    /// carries `n_outputs` values
    pub fn check(&self, n_features: usize, n_outputs: usize) -> Result<()> {
        Self::check_node(&self.root, n_features, n_outputs)
    }

    fn check_node(node: &TreeNode, n_features: usize, n_outputs: usize) -> Result<()> {
        match node {
            TreeNode::Leaf { value, n_samples } => {
                if *n_samples == 0 {
                    return Err(KolosalError::InvalidModel("leaf node has zero cover".to_string()));
                }
                if value.len() != n_outputs {
                    return Err(KolosalError::InvalidModel(format!(
                        "leaf holds {} values, expected {}",
                        value.len(),
                        n_outputs
                    )));
                }
                Ok(())
            }
            TreeNode::Split { feature_idx, threshold, left, right, n_samples } => {
                if *feature_idx >= n_features {
                    return Err(KolosalError::InvalidModel(format!(
                        "split on feature index {} but the model has {} features",
                        feature_idx, n_features
                    )));
                }
                if threshold.is_nan() {
                    return Err(KolosalError::InvalidModel("split threshold is NaN".to_string()));
                }
                if *n_samples != left.n_samples() + right.n_samples() {
                    return Err(KolosalError::InvalidModel(format!(
                        "split cover {} differs from its children's total {}",
                        n_samples,
                        left.n_samples() + right.n_samples()
                    )));
                }
                Self::check_node(left, n_features, n_outputs)?;
                Self::check_node(right, n_features, n_outputs)
            }
        }
    }

    /// Arity of the first leaf
    pub(crate) fn leaf_arity(&self) -> usize {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return value.len(),
                TreeNode::Split { left, .. } => node = left,
            }
        }
    }
}
