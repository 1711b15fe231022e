//! Graph rewrites
//!
//! Each rewrite implements the [`OnnxTransformer`] trait and can be
//! applied on its own or through [`run_transformers`].
//!
//! - **LSTM lowering** ([`lstm`]): replace an LSTM while loop with one
//!   ONNX `LSTM` node
//!
//! # Example
//!
//! ```ignore
//! use rnn_lowering::graph::GraphContext;
//! use rnn_lowering::transformers::{run_transformers, LstmRewriter};
//!
//! let mut ctx = GraphContext::new(&graph);
//! let rewriter = LstmRewriter::new().with_loops(loops);
//!
//! let result = run_transformers(&mut ctx, &[&rewriter])?;
//! println!("Lowered {} loops", result.transforms_applied);
//! ```

/// Common utilities and types
pub mod common;
/// LSTM loop lowering
pub mod lstm;

pub use common::{run_transformers, OnnxTransformer, TransformResult};
pub use lstm::{DeclineReason, LstmRewriter, RewriteOutcome};
