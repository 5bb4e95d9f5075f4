//! Score model
//!
//! - `tree` / `gbdt`: CART regression trees and the boosted ensemble
//! - `compiled`: dense per-tree arrays shared by the tensor evaluator and the ONNX export
//! - `tensor_forest`: batched evaluation of the compiled form on burn tensors

pub mod compiled;
pub mod gbdt;
pub mod tensor_forest;
pub mod tree;

pub use compiled::CompiledEnsemble;
pub use gbdt::GradientBoostingRegressor;
pub use tensor_forest::{ForestBackend, TensorForest};
pub use tree::{RegressionTree, TreeNode, TreeParams};
