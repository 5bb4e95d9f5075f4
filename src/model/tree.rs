//! CART regression tree
//!
//! Trees are stored as flat node arenas with the root at index 0. A sample
//! goes to the left child when `x[feature] <= threshold`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Variance below which a node is considered pure
const PURE_VARIANCE: f64 = 1e-12;

/// Single node of a regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Stopping rules shared by every tree of an ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// Best split found for one node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fit a tree to `targets` over the rows of `x` listed in `indices`
    ///
    /// Rows are assumed rectangular and finite; the ensemble validates them.
    pub fn fit(
        x: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map_or(0, |r| r.len());
        let mut builder = TreeBuilder {
            x,
            targets,
            params,
            n_features,
            nodes: Vec::new(),
        };
        let mut root = indices.to_vec();
        builder.build(&mut root, 0, rng);
        RegressionTree {
            nodes: builder.nodes,
        }
    }

    /// Tree made of a single leaf
    pub fn leaf(value: f64) -> Self {
        RegressionTree {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn n_splits(&self) -> usize {
        self.nodes.len() - self.n_leaves()
    }

    /// Longest root-to-leaf path, counted in splits
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    /// Check that every child lies after its parent and inside the arena
    ///
    /// Children always follow their parent, so this also rules out cycles.
    pub(crate) fn is_well_formed(&self) -> bool {
        let len = self.nodes.len();
        len > 0
            && self.nodes.iter().enumerate().all(|(idx, n)| match n {
                TreeNode::Split { left, right, .. } => {
                    *left > idx && *right > idx && *left < len && *right < len
                }
                TreeNode::Leaf { .. } => true,
            })
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a TreeParams,
    n_features: usize,
    nodes: Vec<TreeNode>,
}

impl TreeBuilder<'_> {
    /// Build the subtree for `indices` and return its node index
    fn build(&mut self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let n = indices.len();
        let mean = indices.iter().map(|&i| self.targets[i]).sum::<f64>() / n.max(1) as f64;
        let variance = indices
            .iter()
            .map(|&i| (self.targets[i] - mean).powi(2))
            .sum::<f64>()
            / n.max(1) as f64;

        let stop = depth >= self.params.max_depth
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf.max(1)
            || variance <= PURE_VARIANCE;

        let split = if stop {
            None
        } else {
            self.best_split(indices, rng)
        };

        let Some(split) = split else {
            self.nodes.push(TreeNode::Leaf { value: mean });
            return self.nodes.len() - 1;
        };

        // Reserve the slot so the parent precedes its children
        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: mean });

        let (left_idx, right_idx) = partition(indices, |i| self.x[i][split.feature] <= split.threshold);
        let left = self.build(left_idx, depth + 1, rng);
        let right = self.build(right_idx, depth + 1, rng);

        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    /// Split maximizing the reduction of the squared error
    fn best_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let parent_score = total * total / n as f64;

        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in features {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.targets[sorted[k - 1]];
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let lo = self.x[sorted[k - 1]][feature];
                let hi = self.x[sorted[k]][feature];
                if lo >= hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / k as f64
                    + right_sum * right_sum / (n - k) as f64
                    - parent_score;

                if gain > best.map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: midpoint(lo, hi),
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Threshold between two consecutive distinct values
///
/// Falls back to the lower value when the midpoint rounds up to the upper one.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi {
        lo
    } else {
        mid
    }
}

/// Reorder `indices` so rows satisfying `goes_left` come first
fn partition(indices: &mut [usize], goes_left: impl Fn(usize) -> bool) -> (&mut [usize], &mut [usize]) {
    let mut boundary = 0;
    for i in 0..indices.len() {
        if goes_left(indices[i]) {
            indices.swap(boundary, i);
            boundary += 1;
        }
    }
    indices.split_at_mut(boundary)
}
