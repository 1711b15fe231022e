//! Tree pattern matching engine
//!
//! A pattern is a tree of op specs rooted at the node that produces the
//! last value of a computation; matching walks producer edges from that
//! root toward the inputs. Pattern nodes may carry a role name, and the
//! match result maps every role to the value and node it bound.

use indexmap::IndexMap;
use tracing::trace;

use crate::graph::GraphContext;
use crate::proto::NodeProto;

use super::ops::{is_commutative, op_spec_accepts, WILDCARD};

/// One node of a tree pattern
#[derive(Debug, Clone, PartialEq)]
pub struct OpPattern {
    /// Op spec: a kind, alternatives joined by `|`, or `*`
    pub op: String,
    /// Role name recorded in the match
    pub role: Option<String>,
    /// Patterns for the producer of each input, in input order
    pub inputs: Vec<OpPattern>,
}

impl OpPattern {
    /// Pattern matching a node of the given op spec
    pub fn new(op: &str) -> Self {
        Self {
            op: op.to_string(),
            role: None,
            inputs: Vec::new(),
        }
    }

    /// Pattern matching any value
    pub fn any() -> Self {
        Self::new(WILDCARD)
    }

    /// Record the matched node under `role`
    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Constrain the producers of the node's inputs
    pub fn inputs(mut self, inputs: Vec<OpPattern>) -> Self {
        self.inputs = inputs;
        self
    }

    fn is_wildcard_leaf(&self) -> bool {
        self.op == WILDCARD && self.inputs.is_empty()
    }
}

/// What a role bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The value the pattern node was reached through
    pub value: String,
    /// Producer of that value; `None` for graph inputs and initializers
    pub node: Option<String>,
}

/// Result of a successful tree match: role → binding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellMatch {
    /// Name of the node the root pattern matched
    pub root: String,
    bindings: IndexMap<String, Binding>,
}

impl CellMatch {
    /// Binding of a role
    pub fn get(&self, role: &str) -> Option<&Binding> {
        self.bindings.get(role)
    }

    /// Value bound to a role
    pub fn value(&self, role: &str) -> Option<&str> {
        self.get(role).map(|b| b.value.as_str())
    }

    /// Node bound to a role
    pub fn node<'g>(&self, ctx: &'g GraphContext, role: &str) -> Option<&'g NodeProto> {
        self.get(role)
            .and_then(|b| b.node.as_deref())
            .and_then(|name| ctx.get_node(name))
    }

    /// Roles in the order they were bound
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Number of bound roles
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no role was bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

type Bindings = IndexMap<String, Binding>;

/// Tree pattern matcher over a graph
pub struct PatternMatcher<'a> {
    ctx: &'a GraphContext,
}

impl<'a> PatternMatcher<'a> {
    /// Create a new pattern matcher
    pub fn new(ctx: &'a GraphContext) -> Self {
        Self { ctx }
    }

    /// Match `pattern` with its root at `root`
    ///
    /// The root's role, if any, binds to the root's first output.
    pub fn match_tree(&self, root: &NodeProto, pattern: &OpPattern) -> Option<CellMatch> {
        let value = root.output.first().map(String::as_str).unwrap_or_default();
        let mut bindings = Bindings::default();
        if !self.match_node(root, value, pattern, &mut bindings) {
            return None;
        }
        trace!(root = %root.name, roles = bindings.len(), "tree pattern matched");
        Some(CellMatch {
            root: root.name.clone(),
            bindings,
        })
    }

    /// Match `pattern` against every named node, in order
    pub fn find_all<'n>(
        &self,
        candidates: impl IntoIterator<Item = &'n NodeProto>,
        pattern: &OpPattern,
    ) -> Vec<CellMatch> {
        candidates
            .into_iter()
            .filter(|node| op_spec_accepts(&pattern.op, &node.op_type))
            .filter_map(|node| self.match_tree(node, pattern))
            .collect()
    }

    fn match_value(&self, value: &str, pattern: &OpPattern, bindings: &mut Bindings) -> bool {
        match self.ctx.get_producer(value) {
            Some(node) => self.match_node(node, value, pattern, bindings),
            None if pattern.is_wildcard_leaf() => bind(bindings, pattern, value, None),
            None => false,
        }
    }

    fn match_node(
        &self,
        node: &NodeProto,
        value: &str,
        pattern: &OpPattern,
        bindings: &mut Bindings,
    ) -> bool {
        if !op_spec_accepts(&pattern.op, &node.op_type) {
            return false;
        }

        if let Some(role) = &pattern.role {
            if let Some(existing) = bindings.get(role) {
                // Shared sub-pattern: already matched below this role
                return existing.node.as_deref() == Some(node.name.as_str());
            }
        }

        if pattern.inputs.is_empty() {
            return bind(bindings, pattern, value, Some(&node.name));
        }
        if node.input.len() != pattern.inputs.len() {
            return false;
        }

        let mut orders: Vec<Vec<usize>> = vec![(0..node.input.len()).collect()];
        if node.input.len() == 2 && is_commutative(&node.op_type) {
            orders.push(vec![1, 0]);
        }

        for order in orders {
            let mut attempt = bindings.clone();
            if !bind(&mut attempt, pattern, value, Some(&node.name)) {
                continue;
            }
            let matched = order.iter().zip(&pattern.inputs).all(|(&i, input_pattern)| {
                self.match_value(&node.input[i], input_pattern, &mut attempt)
            });
            if matched {
                *bindings = attempt;
                return true;
            }
        }
        false
    }
}

fn bind(bindings: &mut Bindings, pattern: &OpPattern, value: &str, node: Option<&str>) -> bool {
    let Some(role) = &pattern.role else {
        return true;
    };
    let binding = Binding {
        value: value.to_string(),
        node: node.map(str::to_string),
    };
    match bindings.get(role) {
        Some(existing) => *existing == binding,
        None => {
            bindings.insert(role.clone(), binding);
            true
        }
    }
}
