//! Common utilities for transformers
//!
//! Shared helper functions and types used across transformers.

use crate::error::OnnxResult;
use crate::graph::GraphContext;
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::{NodeProto, TensorProto};
use crate::tensor::i32_to_dtype;

/// Get attribute value as i64
pub fn get_attr_i(node: &NodeProto, name: &str) -> Option<i64> {
    node.get_attribute(name).map(|a| a.i)
}

/// Get attribute value as f32
pub fn get_attr_f(node: &NodeProto, name: &str) -> Option<f32> {
    node.get_attribute(name).map(|a| a.f)
}

/// Get attribute value as string
pub fn get_attr_s<'a>(node: &'a NodeProto, name: &str) -> Option<&'a str> {
    node.get_attribute_string(name)
        .map(|s| std::str::from_utf8(s).unwrap_or(""))
}

/// Get attribute value as i64 list
pub fn get_attr_ints<'a>(node: &'a NodeProto, name: &str) -> Option<&'a [i64]> {
    node.get_attribute_ints(name)
}

/// Get constant tensor behind a value
///
/// Checks initializers and `Const`/`Constant` producers, looking through
/// `Identity` and `Enter` (a constant read inside a loop body is still a
/// constant).
pub fn get_constant_tensor<'a>(ctx: &'a GraphContext, name: &str) -> Option<&'a TensorProto> {
    let mut current = name;
    loop {
        if let Some(init) = ctx.get_initializer(current) {
            return Some(init);
        }

        let producer = ctx.get_producer(current)?;
        match producer.op_type.as_str() {
            "Const" | "Constant" => return producer.get_attribute("value")?.t.as_ref(),
            "Identity" | "Enter" => current = producer.input.first()?.as_str(),
            _ => return None,
        }
    }
}

/// Get the single integer held by a constant value
///
/// Accepts INT32 and INT64 tensors of one element, typed or raw.
pub fn get_constant_int(ctx: &GraphContext, name: &str) -> Option<i64> {
    let tensor = get_constant_tensor(ctx, name)?;
    match i32_to_dtype(tensor.data_type).ok()? {
        DataType::Int64 => match (tensor.int64_data.as_slice(), tensor.raw_data.as_slice()) {
            ([value], _) => Some(*value),
            ([], raw) => Some(i64::from_le_bytes(raw.try_into().ok()?)),
            _ => None,
        },
        DataType::Int32 => match (tensor.int32_data.as_slice(), tensor.raw_data.as_slice()) {
            ([value], _) => Some(i64::from(*value)),
            ([], raw) => Some(i64::from(i32::from_le_bytes(raw.try_into().ok()?))),
            _ => None,
        },
        _ => None,
    }
}

/// Transformation result for statistics
#[derive(Debug, Default, Clone)]
pub struct TransformResult {
    /// Number of patterns matched
    pub patterns_matched: usize,
    /// Number of transformations applied
    pub transforms_applied: usize,
    /// Names of transformed nodes
    pub transformed_nodes: Vec<String>,
}

impl TransformResult {
    /// Create empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful transformation
    pub fn record(&mut self, node_name: &str) {
        self.transforms_applied += 1;
        self.transformed_nodes.push(node_name.to_string());
    }

    /// Merge with another result
    pub fn merge(&mut self, other: TransformResult) {
        self.patterns_matched += other.patterns_matched;
        self.transforms_applied += other.transforms_applied;
        self.transformed_nodes.extend(other.transformed_nodes);
    }
}

/// Trait for individual transformers
pub trait OnnxTransformer {
    /// Name of the transformer
    fn name(&self) -> &'static str;

    /// Apply the transformation
    fn transform(&self, ctx: &mut GraphContext) -> OnnxResult<TransformResult>;

    /// Check if this transformer is applicable to the graph
    fn is_applicable(&self, _ctx: &GraphContext) -> bool {
        true
    }
}

/// Run multiple transformers in sequence
pub fn run_transformers(
    ctx: &mut GraphContext,
    transformers: &[&dyn OnnxTransformer],
) -> OnnxResult<TransformResult> {
    let mut total = TransformResult::new();

    for transformer in transformers {
        if transformer.is_applicable(ctx) {
            let result = transformer.transform(ctx)?;
            total.merge(result);
        }
    }

    Ok(total)
}
