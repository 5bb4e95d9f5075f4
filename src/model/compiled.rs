//! Tensor form of a fitted ensemble
//!
//! Every tree is lowered to dense per-tree arrays so that the whole ensemble
//! evaluates with a gather, a comparison and two batched matrix products:
//!
//! 1. `goes_right[n, t, i] = x[n, feature[t, i]] > threshold[t, i]`
//! 2. `score[t, n, l] = sum_i goes_right[n, t, i] * path[t, i, l]`
//! 3. leaf `l` of tree `t` is reached when `score == right_turns[t, l]`
//! 4. `out[n] = base + sum_t sum_l reached[t, n, l] * leaf_value[t, l]`
//!
//! `path[t, i, l]` is +1 when the path to leaf `l` goes right at node `i`, -1
//! when it goes left and 0 when the node is not on the path, so `score`
//! equals the number of right turns only on the reached leaf. Trees are
//! padded to the same number of internal nodes and leaves; padded nodes never
//! fire and padded leaves have an unreachable target.

use super::gbdt::GradientBoostingRegressor;
use super::tree::{RegressionTree, TreeNode};
use crate::{PescaError, Result};

/// Dense per-tree arrays of an ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEnsemble {
    pub n_trees: usize,
    /// Internal nodes per tree after padding
    pub n_internal: usize,
    /// Leaves per tree after padding
    pub n_leaves: usize,
    /// Number of input columns the compiled form reads
    pub input_width: usize,
    /// `[n_trees * n_internal]`
    pub feature_index: Vec<i64>,
    /// `[n_trees * n_internal]`
    pub thresholds: Vec<f32>,
    /// `[n_trees, n_internal, n_leaves]`
    pub path_matrix: Vec<f32>,
    /// `[n_trees, 1, n_leaves]`
    pub path_target: Vec<f32>,
    /// `[n_trees, n_leaves, 1]`, already scaled by the learning rate
    pub leaf_values: Vec<f32>,
    pub base_score: f32,
    /// Trained feature indices the input does not carry
    pub pinned_features: Vec<usize>,
}

/// One tree flattened into internal nodes and leaf paths
struct FlatTree {
    internal: Vec<(usize, f64)>,
    /// (value, [(internal index, goes right)])
    leaves: Vec<(f64, Vec<(usize, bool)>)>,
}

fn flatten(tree: &RegressionTree) -> FlatTree {
    let mut flat = FlatTree {
        internal: Vec::new(),
        leaves: Vec::new(),
    };
    let mut stack: Vec<(usize, Vec<(usize, bool)>)> = vec![(0, Vec::new())];
    while let Some((idx, path)) = stack.pop() {
        match tree.nodes()[idx] {
            TreeNode::Leaf { value } => flat.leaves.push((value, path)),
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let internal_idx = flat.internal.len();
                flat.internal.push((feature, threshold));

                let mut right_path = path.clone();
                right_path.push((internal_idx, true));
                let mut left_path = path;
                left_path.push((internal_idx, false));
                stack.push((right, right_path));
                stack.push((left, left_path));
            }
        }
    }
    flat
}

impl CompiledEnsemble {
    /// Lower `model` for an input carrying `input_width` columns
    ///
    /// Splits on a column at or beyond `input_width` read that column as 0.0,
    /// the training mean once features are standardized. Such a split always
    /// takes the same branch and is folded into a constant decision.
    pub fn compile(model: &GradientBoostingRegressor, input_width: usize) -> Result<Self> {
        if !model.is_fitted() {
            return Err(PescaError::Convert("model is not fitted".to_string()));
        }
        if input_width == 0 {
            return Err(PescaError::Convert("input width must be positive".to_string()));
        }

        // An ensemble without stages still needs one tree to carry the shapes
        let placeholder = [RegressionTree::leaf(0.0)];
        let trees = if model.trees().is_empty() {
            &placeholder[..]
        } else {
            model.trees()
        };
        let flat: Vec<FlatTree> = trees.iter().map(flatten).collect();
        let n_trees = flat.len();
        let n_internal = flat.iter().map(|t| t.internal.len()).max().unwrap_or(0).max(1);
        let n_leaves = flat.iter().map(|t| t.leaves.len()).max().unwrap_or(0).max(1);
        let lr = model.learning_rate();

        let mut feature_index = vec![0i64; n_trees * n_internal];
        let mut thresholds = vec![f32::INFINITY; n_trees * n_internal];
        let mut path_matrix = vec![0.0f32; n_trees * n_internal * n_leaves];
        let mut path_target = vec![-1.0f32; n_trees * n_leaves];
        let mut leaf_values = vec![0.0f32; n_trees * n_leaves];
        let mut pinned_features = Vec::new();

        for (t, tree) in flat.iter().enumerate() {
            for (i, &(feature, threshold)) in tree.internal.iter().enumerate() {
                let slot = t * n_internal + i;
                if feature < input_width {
                    feature_index[slot] = feature as i64;
                    thresholds[slot] = threshold as f32;
                } else {
                    pinned_features.push(feature);
                    thresholds[slot] = if 0.0 > threshold {
                        f32::NEG_INFINITY
                    } else {
                        f32::INFINITY
                    };
                }
            }
            for (l, (value, path)) in tree.leaves.iter().enumerate() {
                let mut right_turns = 0.0f32;
                for &(i, goes_right) in path {
                    path_matrix[(t * n_internal + i) * n_leaves + l] = if goes_right {
                        right_turns += 1.0;
                        1.0
                    } else {
                        -1.0
                    };
                }
                path_target[t * n_leaves + l] = right_turns;
                leaf_values[t * n_leaves + l] = (lr * value) as f32;
            }
        }

        pinned_features.sort_unstable();
        pinned_features.dedup();

        Ok(CompiledEnsemble {
            n_trees,
            n_internal,
            n_leaves,
            input_width,
            feature_index,
            thresholds,
            path_matrix,
            path_target,
            leaf_values,
            base_score: model.init_prediction() as f32,
            pinned_features,
        })
    }

    /// Evaluate one row with the same arithmetic as the tensor graph
    pub fn evaluate_row(&self, row: &[f32]) -> f32 {
        let mut out = self.base_score;
        for t in 0..self.n_trees {
            let goes_right: Vec<f32> = (0..self.n_internal)
                .map(|i| {
                    let slot = t * self.n_internal + i;
                    let value = row.get(self.feature_index[slot] as usize).copied().unwrap_or(0.0);
                    if value > self.thresholds[slot] {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            for l in 0..self.n_leaves {
                let score: f32 = goes_right
                    .iter()
                    .enumerate()
                    .map(|(i, g)| g * self.path_matrix[(t * self.n_internal + i) * self.n_leaves + l])
                    .sum();
                if score == self.path_target[t * self.n_leaves + l] {
                    out += self.leaf_values[t * self.n_leaves + l];
                }
            }
        }
        out
    }
}
