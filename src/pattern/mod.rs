//! Pattern matching module for graph rewriting
//!
//! This module provides tools for identifying computation patterns in a
//! graph, which is essential for lowering a decomposed computation into a
//! single fused op.
//!
//! # Overview
//!
//! The pattern matching system works by:
//! 1. Defining patterns as trees of op specs (`"Add|AddV2"`, `"*"`)
//! 2. Matching from a root node toward its inputs
//! 3. Recording role names for the nodes and values the caller needs
//!
//! # Example
//!
//! ```ignore
//! use rnn_lowering::pattern::{OpPattern, PatternMatcher};
//!
//! let pattern = OpPattern::new("Mul").role("ht").inputs(vec![
//!     OpPattern::new("Sigmoid").role("ot"),
//!     OpPattern::new("Tanh"),
//! ]);
//!
//! let matcher = PatternMatcher::new(&ctx);
//! for m in matcher.find_all(ctx.nodes(), &pattern) {
//!     println!("hidden state produced by {}", m.root);
//! }
//! ```
//!
//! # Traversal
//!
//! ```ignore
//! use rnn_lowering::pattern::traversal::{BfsIterator, Direction};
//!
//! // Everything feeding the next-iteration values, fenced at the loop state
//! let body = BfsIterator::from_values(&ctx, next_values, Direction::Backward)
//!     .with_boundary(state_reads)
//!     .collect::<Vec<_>>();
//! ```

pub mod matcher;
pub mod ops;
pub mod traversal;

// Re-export main types
pub use matcher::{Binding, CellMatch, OpPattern, PatternMatcher};
pub use ops::{
    is_commutative, is_concat_op, is_enter_op, is_select_op, is_slice_op,
    is_tensor_array_write_op, op_spec_accepts,
};
pub use traversal::{BfsIterator, Direction};
