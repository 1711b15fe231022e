//! Error types for rnn-lowering
//!
//! This module defines all error types used throughout the crate.
//! A rewrite that merely does not apply is not an error; see
//! [`crate::transformers::lstm::RewriteOutcome`].

use thiserror::Error;

/// Main error type for ONNX transformation operations
#[derive(Error, Debug)]
pub enum TransformError {
    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Shape inference failed
    #[error("Shape inference failed: {0}")]
    ShapeInferenceFailed(String),

    /// Invalid tensor data type
    #[error("Invalid data type: {0}")]
    InvalidDataType(i32),

    /// ndarray rejected a reshape/concatenate
    #[error("Tensor layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ONNX operations
pub type OnnxResult<T> = Result<T, TransformError>;
