//! Graph map types and builders
//!
//! Defines the core data structures for efficient graph traversal.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::proto::{GraphProto, NodeProto, TensorProto, ValueInfoProto};

/// Type alias for producer map: output_name → node_name
pub type ProducerMap = FxHashMap<String, String>;

/// Type alias for consumer map: tensor_name → [consumer_node_names]
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<String, SmallVec<[String; 4]>>;

/// Type alias for node map: node_name → NodeProto (order preserved)
pub type NodeMap = IndexMap<String, NodeProto>;

/// Type alias for initializer map: name → TensorProto
pub type InitializerMap = FxHashMap<String, TensorProto>;

/// Type alias for value info map: name → ValueInfoProto
pub type ValueInfoMap = FxHashMap<String, ValueInfoProto>;

/// Graph inputs/outputs keep their declaration order
pub type BoundaryMap = IndexMap<String, ValueInfoProto>;

/// Build producer map from graph nodes
///
/// Maps each output tensor name to the node that produces it.
pub fn build_producer_map(graph: &GraphProto) -> ProducerMap {
    let mut map = FxHashMap::default();

    for node in &graph.node {
        for output in &node.output {
            if !output.is_empty() {
                map.insert(output.clone(), node.name.clone());
            }
        }
    }

    map
}

/// Build consumer map from graph nodes
///
/// Maps each tensor name to the list of nodes that consume it. A node that
/// reads the same tensor twice is listed twice.
pub fn build_consumer_map(graph: &GraphProto) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    for node in &graph.node {
        for input in &node.input {
            if !input.is_empty() {
                map.entry(input.clone())
                    .or_default()
                    .push(node.name.clone());
            }
        }
    }

    map
}

/// Build node map from graph nodes
///
/// Preserves node order using IndexMap.
pub fn build_node_map(graph: &GraphProto) -> NodeMap {
    graph
        .node
        .iter()
        .map(|node| (node.name.clone(), node.clone()))
        .collect()
}

/// Build initializer map from graph
pub fn build_initializer_map(graph: &GraphProto) -> InitializerMap {
    graph
        .initializer
        .iter()
        .map(|t| (t.name.clone(), t.clone()))
        .collect()
}

/// Build value info map from graph
///
/// Combines graph inputs, outputs, and intermediate value_info.
pub fn build_value_info_map(graph: &GraphProto) -> ValueInfoMap {
    let mut map = FxHashMap::default();

    for vi in graph
        .input
        .iter()
        .chain(&graph.output)
        .chain(&graph.value_info)
    {
        map.insert(vi.name.clone(), vi.clone());
    }

    map
}

/// Build graph input map
pub fn build_graph_input_map(graph: &GraphProto) -> BoundaryMap {
    graph
        .input
        .iter()
        .map(|vi| (vi.name.clone(), vi.clone()))
        .collect()
}

/// Build graph output map
pub fn build_graph_output_map(graph: &GraphProto) -> BoundaryMap {
    graph
        .output
        .iter()
        .map(|vi| (vi.name.clone(), vi.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    fn make_test_graph() -> GraphProto {
        GraphProto {
            node: vec![
                make_node("MatMul", &["xh", "kernel"], &["gates"], "matmul_0"),
                make_node("BiasAdd", &["gates", "bias"], &["biased"], "bias_add_0"),
                make_node("Sigmoid", &["biased"], &["Y"], "sigmoid_0"),
            ],
            input: vec![ValueInfoProto {
                name: "xh".to_string(),
                ..Default::default()
            }],
            output: vec![ValueInfoProto {
                name: "Y".to_string(),
                ..Default::default()
            }],
            initializer: vec![
                TensorProto {
                    name: "kernel".to_string(),
                    ..Default::default()
                },
                TensorProto {
                    name: "bias".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_producer_map() {
        let graph = make_test_graph();
        let map = build_producer_map(&graph);

        assert_eq!(map.get("gates"), Some(&"matmul_0".to_string()));
        assert_eq!(map.get("Y"), Some(&"sigmoid_0".to_string()));
        assert!(map.get("xh").is_none()); // input, not produced by node
    }

    #[test]
    fn test_build_consumer_map() {
        let graph = make_test_graph();
        let map = build_consumer_map(&graph);

        assert_eq!(
            map.get("gates").map(|v| v.as_slice()),
            Some(&["bias_add_0".to_string()][..])
        );
    }

    #[test]
    fn test_build_node_map_preserves_order() {
        let graph = make_test_graph();
        let map = build_node_map(&graph);

        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["matmul_0", "bias_add_0", "sigmoid_0"]);
    }

    #[test]
    fn test_build_initializer_map() {
        let graph = make_test_graph();
        let map = build_initializer_map(&graph);

        assert!(map.contains_key("kernel"));
        assert!(!map.contains_key("xh"));
    }
}
