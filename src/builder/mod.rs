//! Graph export
//!
//! After rewrites are applied to a `GraphContext`, the builder assembles
//! the resulting `GraphProto`:
//!
//! - [`build_graph_from_context`]: nodes in topological order
//! - [`cleanup`]: drop initializers and value_info left unused
//!
//! # Example
//!
//! ```ignore
//! use rnn_lowering::builder::build_clean_graph;
//!
//! ctx.eliminate_dead_nodes();
//! let (graph, stats) = build_clean_graph(&ctx);
//! println!("Removed {} initializers", stats.initializers_removed);
//! ```

pub mod cleanup;
pub mod model;

pub use cleanup::{cleanup_graph, remove_unused_initializers, remove_unused_value_info, CleanupStats};
pub use model::{build_clean_graph, build_graph_from_context};
