//! Graph cleanup utilities
//!
//! A rewrite leaves the replaced loop's constants behind once dead-node
//! elimination has run. These functions drop them from an exported graph.

use rustc_hash::FxHashSet;

use crate::proto::GraphProto;

/// Statistics from cleanup operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    /// Number of initializers removed
    pub initializers_removed: usize,
    /// Number of value_info entries removed
    pub value_info_removed: usize,
}

/// Names read by any node or exposed as a graph output
fn read_tensors(graph: &GraphProto) -> FxHashSet<&str> {
    graph
        .node
        .iter()
        .flat_map(|n| n.input.iter())
        .chain(graph.output.iter().map(|vi| &vi.name))
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect()
}

/// Remove initializers nothing reads
pub fn remove_unused_initializers(graph: &mut GraphProto) -> usize {
    let used: FxHashSet<String> = read_tensors(graph).into_iter().map(str::to_string).collect();
    let before = graph.initializer.len();
    graph.initializer.retain(|t| used.contains(&t.name));
    before - graph.initializer.len()
}

/// Remove value_info for values no node touches
pub fn remove_unused_value_info(graph: &mut GraphProto) -> usize {
    let used: FxHashSet<String> = graph
        .node
        .iter()
        .flat_map(|n| n.input.iter().chain(n.output.iter()))
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();

    let before = graph.value_info.len();
    graph.value_info.retain(|vi| used.contains(&vi.name));
    before - graph.value_info.len()
}

/// Clean up all unused elements in a graph
pub fn cleanup_graph(graph: &mut GraphProto) -> CleanupStats {
    CleanupStats {
        initializers_removed: remove_unused_initializers(graph),
        value_info_removed: remove_unused_value_info(graph),
    }
}
