//! Graph traversal utilities
//!
//! Breadth-first walks that can be fenced by boundary values, so a walk
//! over a loop body stops at the values that carry state into it.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::graph::GraphContext;
use crate::proto::NodeProto;

/// Direction of traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward: follow consumer edges (input → output)
    Forward,
    /// Backward: follow producer edges (output → input)
    Backward,
}

/// BFS traversal iterator
pub struct BfsIterator<'a> {
    ctx: &'a GraphContext,
    queue: VecDeque<&'a str>,
    visited: FxHashSet<&'a str>,
    direction: Direction,
    boundary: FxHashSet<String>,
    halt_ops: &'a [&'a str],
}

impl<'a> BfsIterator<'a> {
    /// Create a new BFS iterator starting from the given node
    pub fn new(ctx: &'a GraphContext, start: &str, direction: Direction) -> Self {
        let mut iter = Self::empty(ctx, direction);
        if let Some((name, _)) = ctx.node_map.get_key_value(start) {
            iter.enqueue(name);
        }
        iter
    }

    /// Create a BFS iterator starting from the nodes adjacent to `values`
    ///
    /// Backward starts at their producers, forward at their consumers.
    pub fn from_values<'v>(
        ctx: &'a GraphContext,
        values: impl IntoIterator<Item = &'v str>,
        direction: Direction,
    ) -> Self {
        let mut iter = Self::empty(ctx, direction);
        for value in values {
            iter.enqueue_neighbours_of_value(value);
        }
        iter
    }

    /// Create backward BFS (follows producers)
    pub fn backward(ctx: &'a GraphContext, start: &str) -> Self {
        Self::new(ctx, start, Direction::Backward)
    }

    /// Create forward BFS (follows consumers)
    pub fn forward(ctx: &'a GraphContext, start: &str) -> Self {
        Self::new(ctx, start, Direction::Forward)
    }

    /// Never step across these values
    pub fn with_boundary(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.boundary.extend(values);
        self
    }

    /// Visit nodes of these kinds but do not expand past them
    pub fn halt_at_ops(mut self, ops: &'a [&'a str]) -> Self {
        self.halt_ops = ops;
        self
    }

    fn empty(ctx: &'a GraphContext, direction: Direction) -> Self {
        Self {
            ctx,
            queue: VecDeque::new(),
            visited: FxHashSet::default(),
            direction,
            boundary: FxHashSet::default(),
            halt_ops: &[],
        }
    }

    fn enqueue(&mut self, name: &'a str) {
        if self.visited.insert(name) {
            self.queue.push_back(name);
        }
    }

    fn enqueue_neighbours_of_value(&mut self, value: &str) {
        if self.boundary.contains(value) {
            return;
        }
        let ctx = self.ctx;
        match self.direction {
            Direction::Backward => {
                if let Some(producer) = ctx.get_producer_name(value) {
                    self.enqueue(producer);
                }
            }
            Direction::Forward => {
                for consumer in ctx.get_consumer_names(value).unwrap_or_default() {
                    self.enqueue(consumer);
                }
            }
        }
    }
}

impl<'a> Iterator for BfsIterator<'a> {
    type Item = &'a NodeProto;

    fn next(&mut self) -> Option<Self::Item> {
        let ctx = self.ctx;
        let name = self.queue.pop_front()?;
        let node = ctx.get_node(name)?;

        if node.is_op_type_in(self.halt_ops) {
            return Some(node);
        }

        let edges = match self.direction {
            Direction::Backward => &node.input,
            Direction::Forward => &node.output,
        };
        for value in edges {
            self.enqueue_neighbours_of_value(value);
        }

        Some(node)
    }
}
