//! Batched ensemble evaluation on burn tensors

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Int, Tensor};

use super::compiled::CompiledEnsemble;
use crate::{PescaError, Result};

/// CPU backend used for ensemble evaluation
pub type ForestBackend = burn::backend::NdArray<f32>;

/// Compiled ensemble uploaded to a burn device
#[derive(Debug, Clone)]
pub struct TensorForest<B: Backend> {
    /// `[T * I]`
    feature_index: Tensor<B, 1, Int>,
    /// `[1, T * I]`
    thresholds: Tensor<B, 2>,
    /// `[T, I, L]`
    path_matrix: Tensor<B, 3>,
    /// `[T, 1, L]`
    path_target: Tensor<B, 3>,
    /// `[T, 1, L]`
    leaf_values: Tensor<B, 3>,
    base_score: f32,
    n_trees: usize,
    n_internal: usize,
    input_width: usize,
}

impl<B: Backend> TensorForest<B> {
    pub fn new(compiled: &CompiledEnsemble, device: &B::Device) -> Self {
        let (t, i, l) = (compiled.n_trees, compiled.n_internal, compiled.n_leaves);
        let indices: Vec<i32> = compiled.feature_index.iter().map(|&f| f as i32).collect();

        TensorForest {
            feature_index: Tensor::<B, 1, Int>::from_ints(indices.as_slice(), device),
            thresholds: Tensor::<B, 1>::from_floats(compiled.thresholds.as_slice(), device)
                .reshape([1, t * i]),
            path_matrix: Tensor::<B, 1>::from_floats(compiled.path_matrix.as_slice(), device)
                .reshape([t, i, l]),
            path_target: Tensor::<B, 1>::from_floats(compiled.path_target.as_slice(), device)
                .reshape([t, 1, l]),
            leaf_values: Tensor::<B, 1>::from_floats(compiled.leaf_values.as_slice(), device)
                .reshape([t, 1, l]),
            base_score: compiled.base_score,
            n_trees: t,
            n_internal: i,
            input_width: compiled.input_width,
        }
    }

    /// Predict `[N, 1]` scores for an `[N, input_width]` batch
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, _] = input.dims();
        let selected = input.select(1, self.feature_index.clone());
        let goes_right = (selected - self.thresholds.clone()).greater_elem(0.0).float();
        let goes_right = goes_right
            .reshape([n, self.n_trees, self.n_internal])
            .swap_dims(0, 1);

        let scores = goes_right.matmul(self.path_matrix.clone());
        let reached = (scores - self.path_target.clone())
            .abs()
            .lower_elem(0.5)
            .float();

        // Leaf contraction per row: [T, N, L] -> [T, N, 1] -> [1, N, 1]
        (reached * self.leaf_values.clone())
            .sum_dim(2)
            .sum_dim(0)
            .reshape([n, 1])
            .add_scalar(self.base_score)
    }

    /// Predict one score per row
    pub fn predict(&self, rows: &[Vec<f32>], device: &B::Device) -> Result<Vec<f32>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != self.input_width) {
            return Err(PescaError::Inference(format!(
                "expected {} columns, got {}",
                self.input_width,
                bad.len()
            )));
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let input =
            Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), self.input_width]);
        tensor_to_vec(self.forward(input))
    }
}

/// Standard normal batch of shape `[rows, width]`
pub fn random_batch<B: Backend>(rows: usize, width: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 2>::random([rows, width], Distribution::Normal(0.0, 1.0), device)
}

pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| PescaError::Inference(format!("{:?}", e)))
}
