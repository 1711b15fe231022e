//! Graph manipulation module
//!
//! This module provides the core infrastructure for working with graphs:
//!
//! - [`GraphContext`]: Central structure for graph operations with O(1) lookups
//! - [`maps`]: Type definitions and builders for graph maps
//!
//! # Example
//!
//! ```ignore
//! use rnn_lowering::graph::GraphContext;
//!
//! let mut ctx = GraphContext::new(&graph);
//!
//! let producer = ctx.get_producer("lstm_cell/mul_2:0");
//! let consumers = ctx.get_consumers("lstm_cell/mul_2:0");
//!
//! let squeeze = ctx.make_node("Squeeze", &["lstm:1"], attrs, 1, &[]);
//! ctx.replace_all_inputs("exit_h:0", &squeeze.output[0], &exclude);
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `producer_map` | output_name → producer node name |
//! | `consumer_map` | tensor_name → consumer node names |
//! | `node_map` | node_name → NodeProto (order preserved) |
//! | `initializer_map` | name → TensorProto |
//! | `value_info_map` | name → ValueInfoProto |
//! | `graph_input_map` / `graph_output_map` | graph boundary, order preserved |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;

// Re-export main types
pub use context::GraphContext;
pub use maps::{
    BoundaryMap, ConsumerMap, InitializerMap, NodeMap, ProducerMap, ValueInfoMap,
};
pub use mutators::OutputType;
