//! Graph context for ONNX model manipulation
//!
//! `GraphContext` is the central structure for working with ONNX graphs.
//! It maintains efficient maps for node lookup, traversal, and manipulation.

use crate::proto::{GraphProto, NodeProto, TensorProto, ValueInfoProto};

use super::maps::{
    build_consumer_map, build_graph_input_map, build_graph_output_map, build_initializer_map,
    build_node_map, build_producer_map, build_value_info_map, BoundaryMap, ConsumerMap,
    InitializerMap, NodeMap, ProducerMap, ValueInfoMap,
};

/// Graph context for efficient graph operations
///
/// Owned by the caller; passes borrow it mutably for the duration of one
/// rewrite.
#[derive(Debug, Clone)]
pub struct GraphContext {
    /// Maps output tensor name → producer node name
    pub producer_map: ProducerMap,

    /// Maps tensor name → consumer node names
    pub consumer_map: ConsumerMap,

    /// Maps node name → node (preserves insertion order)
    pub node_map: NodeMap,

    /// Maps initializer name → TensorProto
    pub initializer_map: InitializerMap,

    /// Maps tensor name → ValueInfoProto (inputs + outputs + value_info)
    pub value_info_map: ValueInfoMap,

    /// Maps graph input name → ValueInfoProto
    pub graph_input_map: BoundaryMap,

    /// Maps graph output name → ValueInfoProto
    pub graph_output_map: BoundaryMap,

    /// Graph name, carried through to the exported graph
    pub name: String,
}

impl GraphContext {
    /// Create a new GraphContext from a GraphProto
    pub fn new(graph: &GraphProto) -> Self {
        Self {
            producer_map: build_producer_map(graph),
            consumer_map: build_consumer_map(graph),
            node_map: build_node_map(graph),
            initializer_map: build_initializer_map(graph),
            value_info_map: build_value_info_map(graph),
            graph_input_map: build_graph_input_map(graph),
            graph_output_map: build_graph_output_map(graph),
            name: graph.name.clone(),
        }
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&NodeProto> {
        self.node_map.get(name)
    }

    /// Check if a node exists
    pub fn has_node(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.node_map.len()
    }

    /// Iterate over all nodes in order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeProto> {
        self.node_map.values()
    }

    /// Iterate over node names in order
    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.node_map.keys()
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Get the producer node for a tensor
    pub fn get_producer(&self, tensor_name: &str) -> Option<&NodeProto> {
        self.producer_map
            .get(tensor_name)
            .and_then(|name| self.get_node(name))
    }

    /// Get the producer node name for a tensor
    pub fn get_producer_name(&self, tensor_name: &str) -> Option<&String> {
        self.producer_map.get(tensor_name)
    }

    /// Get consumer nodes for a tensor
    ///
    /// Each consumer appears once even if it reads the tensor in several
    /// input slots.
    pub fn get_consumers(&self, tensor_name: &str) -> Vec<&NodeProto> {
        let mut consumers: Vec<&NodeProto> = Vec::new();
        for name in self.get_consumer_names(tensor_name).unwrap_or_default() {
            if consumers.iter().any(|c| &c.name == name) {
                continue;
            }
            if let Some(node) = self.get_node(name) {
                consumers.push(node);
            }
        }
        consumers
    }

    /// Get consumer node names for a tensor
    pub fn get_consumer_names(&self, tensor_name: &str) -> Option<&[String]> {
        self.consumer_map.get(tensor_name).map(|v| v.as_slice())
    }

    /// Get the producer nodes of every input of `node`, in input order
    pub fn get_input_nodes(&self, node: &NodeProto) -> Vec<&NodeProto> {
        node.input
            .iter()
            .filter_map(|input| self.get_producer(input))
            .collect()
    }

    /// Check if a tensor is a graph input
    pub fn is_graph_input(&self, name: &str) -> bool {
        self.graph_input_map.contains_key(name)
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, name: &str) -> bool {
        self.graph_output_map.contains_key(name)
    }

    /// Check if a tensor is an initializer
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializer_map.contains_key(name)
    }

    // ========================================================================
    // Value info and initializer accessors
    // ========================================================================

    /// Get value info for a tensor
    pub fn get_value_info(&self, name: &str) -> Option<&ValueInfoProto> {
        self.value_info_map.get(name)
    }

    /// Get initializer by name
    pub fn get_initializer(&self, name: &str) -> Option<&TensorProto> {
        self.initializer_map.get(name)
    }

    /// Check whether a name is already taken by any node, value or constant
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
            || self.producer_map.contains_key(name)
            || self.consumer_map.contains_key(name)
            || self.initializer_map.contains_key(name)
            || self.value_info_map.contains_key(name)
    }

    /// Generate a name with the given prefix that is not used anywhere in
    /// the graph
    pub fn unique_name(&self, prefix: &str) -> String {
        let mut counter = 0;
        loop {
            let name = format!("{}_{}", prefix, counter);
            if !self.is_name_taken(&name) {
                return name;
            }
            counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    fn make_test_graph() -> GraphProto {
        GraphProto {
            node: vec![
                make_node("MatMul", &["X", "W"], &["mm_out"], "matmul_0"),
                make_node("Mul", &["mm_out", "mm_out"], &["sq_out"], "mul_0"),
                make_node("Tanh", &["sq_out"], &["Y"], "tanh_0"),
            ],
            input: vec![ValueInfoProto {
                name: "X".to_string(),
                ..Default::default()
            }],
            output: vec![ValueInfoProto {
                name: "Y".to_string(),
                ..Default::default()
            }],
            initializer: vec![TensorProto {
                name: "W".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_context_creation() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        assert_eq!(ctx.node_count(), 3);
        assert!(ctx.has_node("matmul_0"));
        assert!(ctx.has_node("tanh_0"));
    }

    #[test]
    fn test_get_producer() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        let producer = ctx.get_producer("mm_out").unwrap();
        assert_eq!(producer.name, "matmul_0");

        assert!(ctx.get_producer("X").is_none()); // graph input
    }

    #[test]
    fn test_get_consumers_deduplicates() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        assert_eq!(ctx.get_consumer_names("mm_out").unwrap().len(), 2);
        let consumers = ctx.get_consumers("mm_out");
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].name, "mul_0");
    }

    #[test]
    fn test_get_input_nodes() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        let matmul = ctx.get_node("matmul_0").unwrap();
        assert!(ctx.get_input_nodes(matmul).is_empty());

        let tanh = ctx.get_node("tanh_0").unwrap();
        let inputs = ctx.get_input_nodes(tanh);
        assert_eq!(inputs[0].name, "mul_0");
    }

    #[test]
    fn test_is_graph_input_output() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        assert!(ctx.is_graph_input("X"));
        assert!(!ctx.is_graph_input("mm_out"));
        assert!(ctx.is_graph_output("Y"));
        assert!(ctx.is_initializer("W"));
    }

    #[test]
    fn test_unique_name_skips_taken() {
        let mut graph = make_test_graph();
        graph.node.push(make_node("Relu", &["Y"], &["W_0"], "relu_0"));
        let ctx = GraphContext::new(&graph);

        assert_eq!(ctx.unique_name("W"), "W_1");
        assert_eq!(ctx.unique_name("relu"), "relu_1");
        assert_eq!(ctx.unique_name("Squeeze"), "Squeeze_0");
    }
}
