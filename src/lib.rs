//! # rnn-lowering
//!
//! Lowers LSTM while loops in imported ONNX graphs to a single ONNX `LSTM`
//! node.
//!
//! A TensorFlow LSTM arrives as a frame-style while loop whose body spells
//! out one cell step. This crate recognises the cell, converts its weights
//! to the fused op's layout, and rewires the loop's outputs to the fused
//! op, leaving the dead loop for cleanup.
//!
//! ## Features
//!
//! - **Pattern Matching**: Tree patterns with roles over the loop body
//! - **Weight Relayout**: Gate reordering, forget-bias folding, transposition
//! - **Graph Cleanup**: Dead-node elimination and unused-constant removal
//!
//! ## Example
//!
//! ```ignore
//! use rnn_lowering::prelude::*;
//!
//! let mut ctx = GraphContext::new(&graph);
//! let rewriter = LstmRewriter::new().with_loops(loops);
//! let result = rewriter.transform(&mut ctx)?;
//! ctx.eliminate_dead_nodes();
//! let (graph, _) = build_clean_graph(&ctx);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod error;
pub mod graph;
pub mod loops;
pub mod pattern;
pub mod proto;
pub mod tensor;
pub mod transformers;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use rnn_lowering::prelude::*`
pub mod prelude {
    pub use crate::builder::{build_clean_graph, build_graph_from_context};
    pub use crate::error::{OnnxResult, TransformError};
    pub use crate::graph::GraphContext;
    pub use crate::loops::{LoopProperties, ScanInput, ScanOutput, StateVariable};
    pub use crate::pattern::{CellMatch, OpPattern, PatternMatcher};
    pub use crate::proto::onnx::*;
    pub use crate::transformers::{
        run_transformers, DeclineReason, LstmRewriter, OnnxTransformer, RewriteOutcome,
        TransformResult,
    };
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{OnnxResult, TransformError};
pub use transformers::LstmRewriter;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
