//! Advanced graph accessor methods
//!
//! Op lookup, shape/type queries and node ordering.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::proto::NodeProto;
use crate::tensor::shape_from_value_info;

use super::context::GraphContext;

impl GraphContext {
    // ========================================================================
    // Pattern matching helpers
    // ========================================================================

    /// Find nodes by op type
    pub fn find_nodes_by_op(&self, op_type: &str) -> Vec<&NodeProto> {
        self.nodes().filter(|n| n.op_type == op_type).collect()
    }

    /// Find nodes matching any of the given op types
    pub fn find_nodes_by_ops(&self, op_types: &[&str]) -> Vec<&NodeProto> {
        self.nodes().filter(|n| n.is_op_type_in(op_types)).collect()
    }

    // ========================================================================
    // Shape and type queries
    // ========================================================================

    /// Get the shape of a tensor
    pub fn get_tensor_shape(&self, name: &str) -> Option<Vec<i64>> {
        if let Some(shape) = self.value_info_map.get(name).and_then(shape_from_value_info) {
            return Some(shape);
        }

        self.initializer_map.get(name).map(|init| init.dims.clone())
    }

    /// Get the element type of a tensor
    pub fn get_tensor_elem_type(&self, name: &str) -> Option<i32> {
        if let Some(elem_type) = self.value_info_map.get(name).and_then(|vi| vi.get_elem_type()) {
            return Some(elem_type);
        }

        self.initializer_map.get(name).map(|init| init.data_type)
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Get the topological order of nodes (Kahn's algorithm)
    ///
    /// Loop bodies are cyclic through NextIteration/Merge. Nodes that never
    /// reach in-degree zero are appended in their stored order so every node
    /// appears exactly once.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
        for (name, node) in &self.node_map {
            let preds = node
                .input
                .iter()
                .filter(|input| self.producer_map.contains_key(input.as_str()))
                .count();
            in_degree.insert(name.as_str(), preds);
        }

        let mut queue: VecDeque<&str> = self
            .node_map
            .keys()
            .map(String::as_str)
            .filter(|name| in_degree.get(name) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.node_map.len());
        while let Some(name) = queue.pop_front() {
            result.push(name);

            let Some(node) = self.node_map.get(name) else {
                continue;
            };
            for output in &node.output {
                let Some(consumers) = self.consumer_map.get(output) else {
                    continue;
                };
                for consumer in consumers {
                    if let Some(count) = in_degree.get_mut(consumer.as_str()) {
                        if *count == 0 {
                            continue;
                        }
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(consumer.as_str());
                        }
                    }
                }
            }
        }

        if result.len() < self.node_map.len() {
            let emitted: rustc_hash::FxHashSet<&str> = result.iter().copied().collect();
            let rest: Vec<&str> = self
                .node_map
                .keys()
                .map(String::as_str)
                .filter(|name| !emitted.contains(name))
                .collect();
            result.extend(rest);
        }

        result
    }
}
