//! Tensor utilities for ONNX models
//!
//! This module provides utilities for working with ONNX tensors:
//! - Data type mappings (`dtype`)
//! - Shape utilities (`shape`)
//! - Conversion between TensorProto and ndarray (`convert`)
//!
//! # Example
//!
//! ```ignore
//! use rnn_lowering::tensor::{FloatArray, tensor_to_array_f32};
//!
//! // Keep the trained element type while transforming
//! let kernel = FloatArray::from_tensor(&tensor)?;
//! let restored = kernel.to_tensor("kernel");
//! ```

pub mod convert;
pub mod dtype;
pub mod shape;

// Re-export commonly used items
pub use convert::{
    array_to_tensor_f32, array_to_tensor_f64, tensor_to_array_f32, tensor_to_array_f64,
    FloatArray,
};
pub use dtype::{dtype_size, i32_to_dtype};
pub use shape::{dim_or_unknown, numel, shape_from_value_info};
