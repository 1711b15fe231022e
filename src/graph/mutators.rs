//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding, removing, and rewiring
//! nodes, and registering new constants.

use rustc_hash::FxHashSet;

use crate::proto::extensions::make_tensor_value_info;
use crate::proto::{AttributeProto, NodeProto, TensorProto, ValueInfoProto};

use super::context::GraphContext;

/// Declared element type and shape of a node output
///
/// Unknown dimensions are `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputType {
    /// ONNX element type
    pub elem_type: i32,
    /// Dimensions
    pub shape: Vec<i64>,
}

impl OutputType {
    /// Create a new output type
    pub fn new(elem_type: i32, shape: Vec<i64>) -> Self {
        Self { elem_type, shape }
    }
}

impl GraphContext {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a new node into the graph
    ///
    /// Updates all relevant maps.
    pub fn insert_node(&mut self, node: NodeProto) {
        let name = node.name.clone();

        for output in &node.output {
            if !output.is_empty() {
                self.producer_map.insert(output.clone(), name.clone());
            }
        }

        for input in &node.input {
            if !input.is_empty() {
                self.consumer_map
                    .entry(input.clone())
                    .or_default()
                    .push(name.clone());
            }
        }

        self.node_map.insert(name, node);
    }

    /// Remove a node from the graph
    ///
    /// Keeps the relative order of the remaining nodes. Consumers of the
    /// removed node's outputs are left dangling.
    pub fn remove_node(&mut self, name: &str) -> Option<NodeProto> {
        let node = self.node_map.shift_remove(name)?;

        for output in &node.output {
            if self.producer_map.get(output).map(String::as_str) == Some(name) {
                self.producer_map.remove(output);
            }
        }

        for input in &node.input {
            self.remove_consumer(input, name);
        }

        Some(node)
    }

    /// Create a node with a fresh name and insert it
    ///
    /// Outputs are named `<node>:<index>`. When `types` is non-empty it
    /// declares the output types in order and registers value_info for them.
    pub fn make_node(
        &mut self,
        op_type: &str,
        inputs: &[&str],
        attributes: Vec<AttributeProto>,
        output_count: usize,
        types: &[OutputType],
    ) -> NodeProto {
        let name = self.unique_name(op_type);
        let output: Vec<String> = (0..output_count)
            .map(|i| format!("{}:{}", name, i))
            .collect();

        for (out, ty) in output.iter().zip(types) {
            self.set_value_info(make_tensor_value_info(out, ty.elem_type, &ty.shape));
        }

        let node = NodeProto {
            name,
            op_type: op_type.to_string(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output,
            attribute: attributes,
            ..Default::default()
        };
        self.insert_node(node.clone());
        node
    }

    // ========================================================================
    // Initializer mutation
    // ========================================================================

    /// Add or update an initializer
    pub fn set_initializer(&mut self, tensor: TensorProto) {
        let name = tensor.name.clone();
        self.initializer_map.insert(name, tensor);
    }

    /// Register `tensor` as a new constant under a fresh name derived from
    /// `prefix` and return that name
    pub fn make_const(&mut self, prefix: &str, mut tensor: TensorProto) -> String {
        let name = self.unique_name(prefix);
        tensor.name = name.clone();
        self.set_value_info(make_tensor_value_info(
            &name,
            tensor.data_type,
            &tensor.dims,
        ));
        self.set_initializer(tensor);
        name
    }

    // ========================================================================
    // Value info mutation
    // ========================================================================

    /// Add or update value info
    pub fn set_value_info(&mut self, vi: ValueInfoProto) {
        let name = vi.name.clone();
        self.value_info_map.insert(name, vi);
    }

    // ========================================================================
    // Map update helpers
    // ========================================================================

    /// Add a consumer to a tensor
    pub fn add_consumer(&mut self, tensor_name: &str, node_name: &str) {
        self.consumer_map
            .entry(tensor_name.to_string())
            .or_default()
            .push(node_name.to_string());
    }

    /// Remove one consumer entry of a node from a tensor
    pub fn remove_consumer(&mut self, tensor_name: &str, node_name: &str) {
        if let Some(consumers) = self.consumer_map.get_mut(tensor_name) {
            if let Some(pos) = consumers.iter().position(|n| n == node_name) {
                consumers.remove(pos);
            }
            if consumers.is_empty() {
                self.consumer_map.remove(tensor_name);
            }
        }
    }

    // ========================================================================
    // Node input manipulation
    // ========================================================================

    /// Update a node's input at the given index
    pub fn update_node_input(&mut self, node_name: &str, index: usize, new_input: &str) -> bool {
        let Some(node) = self.node_map.get_mut(node_name) else {
            return false;
        };
        if index >= node.input.len() {
            return false;
        }

        let old_input = std::mem::replace(&mut node.input[index], new_input.to_string());
        if !old_input.is_empty() {
            self.remove_consumer(&old_input, node_name);
        }
        if !new_input.is_empty() {
            self.add_consumer(new_input, node_name);
        }
        true
    }

    /// Redirect every read of `old` to `new`
    ///
    /// Only nodes present at call time are rewritten, and nodes named in
    /// `exclude` are skipped. A graph output named `old` is renamed to `new`
    /// in place. Returns the number of rewritten input slots.
    pub fn replace_all_inputs(
        &mut self,
        old: &str,
        new: &str,
        exclude: &FxHashSet<String>,
    ) -> usize {
        let consumers: Vec<String> = self
            .get_consumers(old)
            .into_iter()
            .filter(|n| !exclude.contains(&n.name))
            .map(|n| n.name.clone())
            .collect();

        let mut replaced = 0;
        for name in consumers {
            let slots: Vec<usize> = self
                .get_node(&name)
                .map(|n| {
                    n.input
                        .iter()
                        .enumerate()
                        .filter(|(_, input)| input.as_str() == old)
                        .map(|(i, _)| i)
                        .collect()
                })
                .unwrap_or_default();

            for index in slots {
                if self.update_node_input(&name, index, new) {
                    replaced += 1;
                }
            }
        }

        if self.graph_output_map.contains_key(old) {
            self.rename_graph_output(old, new);
            replaced += 1;
        }

        replaced
    }

    fn rename_graph_output(&mut self, old: &str, new: &str) {
        let outputs = std::mem::take(&mut self.graph_output_map);
        self.graph_output_map = outputs
            .into_iter()
            .map(|(name, vi)| {
                if name != old {
                    return (name, vi);
                }
                let vi = self
                    .value_info_map
                    .get(new)
                    .cloned()
                    .unwrap_or(ValueInfoProto {
                        name: new.to_string(),
                        ..vi
                    });
                (new.to_string(), vi)
            })
            .collect();
    }

    // ========================================================================
    // Dead node elimination
    // ========================================================================

    /// Remove every node that does not contribute to a graph output
    ///
    /// Returns the number of removed nodes.
    pub fn eliminate_dead_nodes(&mut self) -> usize {
        let mut live: FxHashSet<String> = FxHashSet::default();
        let mut stack: Vec<String> = self
            .graph_output_map
            .keys()
            .filter_map(|out| self.get_producer_name(out).cloned())
            .collect();

        while let Some(name) = stack.pop() {
            if !live.insert(name.clone()) {
                continue;
            }
            if let Some(node) = self.get_node(&name) {
                stack.extend(
                    node.input
                        .iter()
                        .filter_map(|input| self.get_producer_name(input))
                        .filter(|producer| !live.contains(*producer))
                        .cloned(),
                );
            }
        }

        let dead: Vec<String> = self
            .node_names()
            .filter(|name| !live.contains(*name))
            .cloned()
            .collect();

        for name in &dead {
            self.remove_node(name);
        }
        dead.len()
    }
}
