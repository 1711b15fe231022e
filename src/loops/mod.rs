//! Loop analysis contract
//!
//! A frame-style while loop as it appears after import: values enter
//! through `Enter`, each iteration reads carried state through a
//! `Switch`/`Identity` pair and feeds the next step through
//! `NextIteration`, and final values leave through `Exit`. Locating those
//! edges is the job of the loop analysis that builds [`LoopProperties`];
//! rewrites only consume the result.

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::graph::GraphContext;
use crate::pattern::ops::{is_select_op, is_tensor_array_write_op, ENTER_OPS};
use crate::pattern::{BfsIterator, Direction};
use crate::proto::NodeProto;

/// One loop-carried value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    /// Value bound to the state before the loop
    pub enter_input_id: String,
    /// The state as read inside the body (output of the switch's true-branch identity)
    pub switch_true_identity_output: String,
    /// Value fed back for the next iteration
    pub next_iteration_input: String,
    /// Value read after the loop, if anything reads it
    pub exit_output: Option<String>,
}

impl StateVariable {
    /// Create a state variable description
    pub fn new(
        enter_input_id: &str,
        switch_true_identity_output: &str,
        next_iteration_input: &str,
        exit_output: Option<&str>,
    ) -> Self {
        Self {
            enter_input_id: enter_input_id.to_string(),
            switch_true_identity_output: switch_true_identity_output.to_string(),
            next_iteration_input: next_iteration_input.to_string(),
            exit_output: exit_output.map(str::to_string),
        }
    }
}

/// A sequence read one step per iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInput {
    /// The whole sequence, `[seq, batch, feature]`, before the loop
    pub enter_input_id: String,
    /// The current step's slice inside the body
    pub iteration_output: String,
}

/// A sequence written one step per iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutput {
    /// The value written each step
    pub iteration_input: String,
    /// The stacked sequence after the loop, if anything reads it
    pub exit_output: Option<String>,
}

/// Everything known about one loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopProperties {
    /// Loop (frame) name, used in logs
    pub name: String,
    /// Loop-carried values
    pub state_variables: Vec<StateVariable>,
    /// Per-step inputs
    pub scan_inputs: Vec<ScanInput>,
    /// Per-step outputs
    pub scan_outputs: Vec<ScanOutput>,
    /// Per-batch sequence lengths, when the loop was built with them
    pub sequence_length: Option<String>,
}

impl LoopProperties {
    /// Create an empty loop description
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Add a loop-carried value
    pub fn with_state(mut self, state: StateVariable) -> Self {
        self.state_variables.push(state);
        self
    }

    /// Add a per-step input
    pub fn with_scan_input(mut self, enter_input_id: &str, iteration_output: &str) -> Self {
        self.scan_inputs.push(ScanInput {
            enter_input_id: enter_input_id.to_string(),
            iteration_output: iteration_output.to_string(),
        });
        self
    }

    /// Add a per-step output
    pub fn with_scan_output(mut self, iteration_input: &str, exit_output: Option<&str>) -> Self {
        self.scan_outputs.push(ScanOutput {
            iteration_input: iteration_input.to_string(),
            exit_output: exit_output.map(str::to_string),
        });
        self
    }

    /// Set the sequence-length value
    pub fn with_sequence_length(mut self, value: &str) -> Self {
        self.sequence_length = Some(value.to_string());
        self
    }

    /// State variables satisfying `pred`
    pub fn get_variables(&self, pred: impl Fn(&StateVariable) -> bool) -> Vec<&StateVariable> {
        self.state_variables.iter().filter(|v| pred(v)).collect()
    }

    /// Nodes computing one iteration
    ///
    /// Walks backward from every next-iteration and scan-output value and
    /// stops at the state reads, the scan reads and `Enter` nodes.
    pub fn body_nodes<'g>(&self, ctx: &'g GraphContext) -> Vec<&'g NodeProto> {
        let starts = self
            .state_variables
            .iter()
            .map(|v| v.next_iteration_input.as_str())
            .chain(self.scan_outputs.iter().map(|s| s.iteration_input.as_str()));

        let boundary = self
            .state_variables
            .iter()
            .map(|v| v.switch_true_identity_output.clone())
            .chain(self.scan_inputs.iter().map(|s| s.iteration_output.clone()));

        BfsIterator::from_values(ctx, starts, Direction::Backward)
            .with_boundary(boundary)
            .halt_at_ops(ENTER_OPS)
            .collect()
    }
}

/// Resolve the state variable that `producer_value` feeds
///
/// If exactly one `Select` consumes `producer_value` without its result
/// being written to a tensor array, the select's output is what reaches
/// the next iteration, and the select itself must read the state too. The
/// state variable is then the unique one whose next-iteration input is
/// that value and whose in-body read feeds every node in `consumers`.
pub fn find_state_variable_with_select<'l>(
    ctx: &GraphContext,
    loop_props: &'l LoopProperties,
    producer_value: &str,
    consumers: &[&str],
) -> Option<&'l StateVariable> {
    let selects: Vec<&NodeProto> = ctx
        .get_consumers(producer_value)
        .into_iter()
        .filter(|c| is_select_op(&c.op_type))
        .filter(|c| {
            !c.output.iter().any(|out| {
                ctx.get_consumers(out)
                    .iter()
                    .any(|cc| is_tensor_array_write_op(&cc.op_type))
            })
        })
        .collect();

    let mut next_iteration_input = producer_value;
    let mut consumer_names: FxHashSet<&str> = consumers.iter().copied().collect();
    if let [select] = selects.as_slice() {
        if let Some(out) = select.output.first() {
            next_iteration_input = out.as_str();
        }
        consumer_names.insert(select.name.as_str());
    }

    trace!(
        loop_name = %loop_props.name,
        value = next_iteration_input,
        consumers = consumer_names.len(),
        "resolving state variable"
    );

    let candidates = loop_props.get_variables(|v| {
        v.next_iteration_input == next_iteration_input
            && consumer_names.iter().all(|name| {
                ctx.get_node(name)
                    .is_some_and(|n| n.input.contains(&v.switch_true_identity_output))
            })
    });

    match candidates.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
