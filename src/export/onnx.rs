//! ONNX model construction
//!
//! Builds the `ModelProto` messages published by tract and serializes them
//! with prost.

use prost::Message;
use tract_onnx::pb::attribute_proto::AttributeType;
use tract_onnx::pb::tensor_proto::DataType;
use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};
use tract_onnx::pb::{
    type_proto, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    TensorProto, TensorShapeProto, TypeProto, ValueInfoProto,
};

use crate::model::CompiledEnsemble;
use crate::{ExportConfig, PescaError, Result};

pub const IR_VERSION: i64 = 7;

/// Default-domain operator set. `ReduceSum` takes `axes` as an attribute up to 12.
pub const OPSET_VERSION: i64 = 12;

pub const PRODUCER_NAME: &str = "pesca";

/// Symbolic batch dimension name
pub const BATCH_DIM: &str = "N";

fn node(op_type: &str, inputs: &[&str], output: &str) -> NodeProto {
    NodeProto {
        name: format!("{}_{}", op_type.to_lowercase(), output),
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: vec![output.to_string()],
        ..Default::default()
    }
}

fn int_attr(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

fn ints_attr(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: values.to_vec(),
        ..Default::default()
    }
}

fn float_init(name: &str, dims: &[usize], data: &[f32]) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: dims.iter().map(|&d| d as i64).collect(),
        data_type: DataType::Float as i32,
        raw_data: data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ..Default::default()
    }
}

fn int_init(name: &str, data: &[i64]) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: vec![data.len() as i64],
        data_type: DataType::Int64 as i32,
        raw_data: data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ..Default::default()
    }
}

/// Float tensor declaration; `None` dimensions are the symbolic batch
fn float_value_info(name: &str, dims: &[Option<i64>]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| Dimension {
            value: Some(match d {
                Some(v) => dimension::Value::DimValue(*v),
                None => dimension::Value::DimParam(BATCH_DIM.to_string()),
            }),
            ..Default::default()
        })
        .collect();
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: DataType::Float as i32,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the inference graph of a compiled ensemble
///
/// Input `[N, input_width]` float, output `[N, 1]` float.
pub fn ensemble_graph(compiled: &CompiledEnsemble, export: &ExportConfig) -> ModelProto {
    let (t, i, l) = (compiled.n_trees, compiled.n_internal, compiled.n_leaves);
    let input = export.input_name.as_str();
    let output = export.output_name.as_str();

    let initializer = vec![
        int_init("feature_index", &compiled.feature_index),
        float_init("thresholds", &[t * i], &compiled.thresholds),
        int_init("decision_shape", &[0, t as i64, i as i64]),
        float_init("path_matrix", &[t, i, l], &compiled.path_matrix),
        float_init("path_target", &[t, 1, l], &compiled.path_target),
        float_init("leaf_values", &[t, l, 1], &compiled.leaf_values),
        float_init("base_score", &[1], &[compiled.base_score]),
    ];

    let mut gather = node("Gather", &[input, "feature_index"], "selected");
    gather.attribute.push(int_attr("axis", 1));
    let mut cast_decisions = node("Cast", &["goes_right_bool"], "goes_right");
    cast_decisions.attribute.push(int_attr("to", DataType::Float as i64));
    let mut transpose = node("Transpose", &["decisions"], "decisions_by_tree");
    transpose.attribute.push(ints_attr("perm", &[1, 0, 2]));
    let mut cast_reached = node("Cast", &["reached_bool"], "reached");
    cast_reached.attribute.push(int_attr("to", DataType::Float as i64));
    let mut reduce = node("ReduceSum", &["tree_outputs"], "ensemble_sum");
    reduce.attribute.push(ints_attr("axes", &[0]));
    reduce.attribute.push(int_attr("keepdims", 0));

    let nodes = vec![
        gather,
        node("Greater", &["selected", "thresholds"], "goes_right_bool"),
        cast_decisions,
        node("Reshape", &["goes_right", "decision_shape"], "decisions"),
        transpose,
        node("MatMul", &["decisions_by_tree", "path_matrix"], "path_scores"),
        node("Equal", &["path_scores", "path_target"], "reached_bool"),
        cast_reached,
        node("MatMul", &["reached", "leaf_values"], "tree_outputs"),
        reduce,
        node("Add", &["ensemble_sum", "base_score"], output),
    ];

    ModelProto {
        ir_version: IR_VERSION,
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        model_version: 1,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET_VERSION,
        }],
        graph: Some(GraphProto {
            name: "pesca_gbr".to_string(),
            doc_string: format!("Gradient boosting regressor, {} trees", t),
            node: nodes,
            initializer,
            input: vec![float_value_info(input, &[None, Some(compiled.input_width as i64)])],
            output: vec![float_value_info(output, &[None, Some(1)])],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Serialize a model to ONNX protobuf bytes
pub fn encode_model(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

/// Declared name and shape of the first graph input; `None` is a symbolic dimension
pub fn read_input_signature(bytes: &[u8]) -> Result<(String, Vec<Option<usize>>)> {
    let missing = |what: &str| PescaError::Parse(format!("ONNX model has no {}", what));

    let model = ModelProto::decode(bytes)
        .map_err(|e| PescaError::Parse(format!("invalid ONNX model: {}", e)))?;
    let input = model
        .graph
        .as_ref()
        .ok_or_else(|| missing("graph"))?
        .input
        .first()
        .ok_or_else(|| missing("input"))?;

    let tensor = match input.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(type_proto::Value::TensorType(tensor)) => tensor,
        None => return Err(missing("tensor input")),
    };
    let shape = tensor.shape.as_ref().ok_or_else(|| missing("input shape"))?;

    let dims = shape
        .dim
        .iter()
        .map(|d| match d.value {
            Some(dimension::Value::DimValue(v)) if v >= 0 => Some(v as usize),
            _ => None,
        })
        .collect();
    Ok((input.name.clone(), dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradientBoostingRegressor;

    fn compiled(width: usize) -> CompiledEnsemble {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| (0..width).map(|j| ((i + j * 3) % 9) as f64).collect())
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * 2.0 - r[width - 1]).collect();
        let mut model = GradientBoostingRegressor::new().with_n_estimators(5);
        model.fit(&x, &y).unwrap();
        CompiledEnsemble::compile(&model, width).unwrap()
    }

    #[test]
    fn test_declared_input_signature() {
        let model = ensemble_graph(&compiled(13), &ExportConfig::default());
        let (name, dims) = read_input_signature(&encode_model(&model)).unwrap();
        assert_eq!(name, "input");
        assert_eq!(dims, vec![None, Some(13)]);
    }

    #[test]
    fn test_header_fields() {
        let bytes = encode_model(&ensemble_graph(&compiled(3), &ExportConfig::default()));
        let model = ModelProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(model.ir_version, 7);
        assert_eq!(model.producer_name, "pesca");
        assert_eq!(model.opset_import.len(), 1);
        assert_eq!(model.opset_import[0].version, 12);
    }

    #[test]
    fn test_reduce_sum_uses_axes_attribute() {
        let model = ensemble_graph(&compiled(3), &ExportConfig::default());
        let graph = model.graph.unwrap();
        let reduce = graph.node.iter().find(|n| n.op_type == "ReduceSum").unwrap();
        assert_eq!(reduce.input.len(), 1);
        let axes = reduce.attribute.iter().find(|a| a.name == "axes").unwrap();
        assert_eq!(axes.ints, vec![0]);
    }

    #[test]
    fn test_nodes_are_topologically_ordered() {
        let graph = ensemble_graph(&compiled(3), &ExportConfig::default()).graph.unwrap();
        let mut known: Vec<String> = graph.initializer.iter().map(|i| i.name.clone()).collect();
        known.push("input".to_string());
        for node in &graph.node {
            for input in &node.input {
                assert!(known.contains(input), "{} used before definition", input);
            }
            known.extend(node.output.iter().cloned());
        }
        assert_eq!(graph.node.last().unwrap().output, vec!["output".to_string()]);
    }

    #[test]
    fn test_initializer_sizes_match_dims() {
        let graph = ensemble_graph(&compiled(4), &ExportConfig::default()).graph.unwrap();
        for init in &graph.initializer {
            let expected: i64 = init.dims.iter().product();
            let elem_size = if init.data_type == DataType::Int64 as i32 { 8 } else { 4 };
            assert_eq!(init.raw_data.len() as i64, expected * elem_size, "{}", init.name);
        }
    }

    #[test]
    fn test_garbage_bytes_are_parse_error() {
        assert!(matches!(
            read_input_signature(&[0xff, 0xff, 0xff]),
            Err(PescaError::Parse(_))
        ));
    }
}
