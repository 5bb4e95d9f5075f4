//! Portable model export
//!
//! Lowers the boosted ensemble to an ONNX graph, writes it and checks that
//! an ONNX runtime can execute it.

pub mod converter;
pub mod onnx;

pub use converter::{run_conversion, ConversionReport};
pub use onnx::{encode_model, ensemble_graph, read_input_signature};
