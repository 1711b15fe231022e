//! Graph export from a working context

use crate::graph::GraphContext;
use crate::proto::{GraphProto, NodeProto};

use super::cleanup::{cleanup_graph, CleanupStats};

/// Build a GraphProto from a GraphContext
///
/// Nodes are emitted in topological order. Loop back-edges make some
/// graphs cyclic; those nodes keep their stored order after the ordered
/// ones. Initializers and value_info are copied as they are.
pub fn build_graph_from_context(ctx: &GraphContext) -> GraphProto {
    let node: Vec<NodeProto> = ctx
        .topological_order()
        .into_iter()
        .filter_map(|name| ctx.get_node(name))
        .cloned()
        .collect();

    let boundary: Vec<&str> = ctx
        .graph_input_map
        .keys()
        .chain(ctx.graph_output_map.keys())
        .map(String::as_str)
        .collect();

    let mut value_info: Vec<_> = ctx
        .value_info_map
        .values()
        .filter(|vi| !boundary.contains(&vi.name.as_str()))
        .cloned()
        .collect();
    value_info.sort_by(|a, b| a.name.cmp(&b.name));

    let mut initializer: Vec<_> = ctx.initializer_map.values().cloned().collect();
    initializer.sort_by(|a, b| a.name.cmp(&b.name));

    GraphProto {
        name: ctx.name.clone(),
        node,
        initializer,
        input: ctx.graph_input_map.values().cloned().collect(),
        output: ctx.graph_output_map.values().cloned().collect(),
        value_info,
        ..Default::default()
    }
}

/// Build a GraphProto and drop constants and value_info nothing reads
pub fn build_clean_graph(ctx: &GraphContext) -> (GraphProto, CleanupStats) {
    let mut graph = build_graph_from_context(ctx);
    let stats = cleanup_graph(&mut graph);
    (graph, stats)
}
