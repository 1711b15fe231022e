//! Shape utilities for ONNX tensors
//!
//! Functions for working with tensor shapes and dimensions.

use crate::proto::ValueInfoProto;

/// Calculate total number of elements from shape
pub fn numel(shape: &[i64]) -> usize {
    if shape.is_empty() {
        1 // scalar
    } else {
        shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Extract shape from ValueInfoProto
pub fn shape_from_value_info(vi: &ValueInfoProto) -> Option<Vec<i64>> {
    vi.get_shape()
}

/// Dimension at `index`, or `-1` when the shape is unknown or too short
pub fn dim_or_unknown(shape: Option<&[i64]>, index: usize) -> i64 {
    shape.and_then(|s| s.get(index).copied()).unwrap_or(-1)
}
