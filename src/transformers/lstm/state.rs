//! Loop-carried state resolution
//!
//! A cell carries its cell state `c` and hidden state `h` either as two
//! loop variables or as one variable holding `concat(c, h)` that the body
//! slices apart. Which one applies decides how the fused op's initial
//! states are fed and how its final states are reconnected.

use tracing::trace;

use crate::graph::GraphContext;
use crate::loops::{find_state_variable_with_select, LoopProperties, StateVariable};
use crate::pattern::{is_concat_op, is_slice_op, CellMatch};
use crate::proto::NodeProto;

use super::cell::{block_outputs, CellVariant};

/// How the cell's state is carried through the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBinding {
    /// `c` and `h` are separate loop variables
    Split {
        /// Cell state
        ct: StateVariable,
        /// Hidden state
        ht: StateVariable,
    },
    /// One loop variable holds `concat(c, h)` along the feature axis
    Shared {
        /// Combined state
        ct_ht: StateVariable,
    },
}

impl StateBinding {
    /// Number of loop variables this binding accounts for
    pub fn variable_count(&self) -> usize {
        match self {
            StateBinding::Split { .. } => 2,
            StateBinding::Shared { .. } => 1,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            StateBinding::Split { .. } => "split",
            StateBinding::Shared { .. } => "shared",
        }
    }
}

/// Values the cell produces its new states in, with the in-body nodes
/// known to read the previous states
struct CellStates<'g> {
    ct: &'g str,
    ht: &'g str,
    ct_reader: &'g NodeProto,
    ht_reader: &'g NodeProto,
}

fn cell_states<'g>(
    ctx: &'g GraphContext,
    variant: CellVariant,
    m: &CellMatch,
) -> Option<CellStates<'g>> {
    match variant {
        CellVariant::LstmCell => {
            let ct = m.node(ctx, "ct")?;
            let ht = m.node(ctx, "ht")?;
            Some(CellStates {
                ct: ct.output.first()?,
                ht: ht.output.first()?,
                ct_reader: m.node(ctx, "ct_identity_consumer")?,
                ht_reader: m.node(ctx, "xh")?,
            })
        }
        CellVariant::LstmBlockCell => {
            let block = m.node(ctx, "lstm_block_cell")?;
            Some(CellStates {
                ct: block.output.get(block_outputs::CS)?,
                ht: block.output.get(block_outputs::H)?,
                ct_reader: block,
                ht_reader: block,
            })
        }
    }
}

/// Value the cell writes its new hidden state to
pub fn hidden_state_value<'g>(
    ctx: &'g GraphContext,
    variant: CellVariant,
    m: &CellMatch,
) -> Option<&'g str> {
    cell_states(ctx, variant, m).map(|s| s.ht)
}

/// Resolve the state binding, trying split before shared
pub fn resolve_state(
    ctx: &GraphContext,
    loop_props: &LoopProperties,
    variant: CellVariant,
    m: &CellMatch,
) -> Option<StateBinding> {
    let states = cell_states(ctx, variant, m)?;

    if let Some((ct, ht)) = find_split(ctx, loop_props, &states) {
        return Some(StateBinding::Split { ct, ht });
    }
    if variant == CellVariant::LstmBlockCell {
        return None;
    }
    find_shared(ctx, loop_props, &states).map(|ct_ht| StateBinding::Shared { ct_ht })
}

fn find_split(
    ctx: &GraphContext,
    loop_props: &LoopProperties,
    states: &CellStates<'_>,
) -> Option<(StateVariable, StateVariable)> {
    let ct = find_state_variable_with_select(
        ctx,
        loop_props,
        states.ct,
        &[states.ct_reader.name.as_str()],
    );
    let ht = find_state_variable_with_select(
        ctx,
        loop_props,
        states.ht,
        &[states.ht_reader.name.as_str()],
    );
    trace!(ct = ct.is_some(), ht = ht.is_some(), "split state lookup");
    Some((ct?.clone(), ht?.clone()))
}

fn find_shared(
    ctx: &GraphContext,
    loop_props: &LoopProperties,
    states: &CellStates<'_>,
) -> Option<StateVariable> {
    let ct_concat = concat_consumers(ctx, states.ct);
    let ht_concat = concat_consumers(ctx, states.ht);
    let concat = match (ct_concat.as_slice(), ht_concat.as_slice()) {
        ([a], [b]) if a.name == b.name => *a,
        _ => return None,
    };

    // The join keeps cell state first
    let ct_pos = concat.input.iter().position(|i| i == states.ct)?;
    let ht_pos = concat.input.iter().position(|i| i == states.ht)?;
    if ct_pos >= ht_pos {
        return None;
    }

    let ct_slice = single_slice_input(ctx, states.ct_reader)?;
    let ht_slice = single_slice_input(ctx, states.ht_reader)?;

    find_state_variable_with_select(
        ctx,
        loop_props,
        concat.output.first()?,
        &[ct_slice.name.as_str(), ht_slice.name.as_str()],
    )
    .cloned()
}

fn concat_consumers<'g>(ctx: &'g GraphContext, value: &str) -> Vec<&'g NodeProto> {
    ctx.get_consumers(value)
        .into_iter()
        .filter(|c| is_concat_op(&c.op_type))
        .collect()
}

fn single_slice_input<'g>(ctx: &'g GraphContext, node: &NodeProto) -> Option<&'g NodeProto> {
    let slices: Vec<&NodeProto> = ctx
        .get_input_nodes(node)
        .into_iter()
        .filter(|n| is_slice_op(&n.op_type))
        .collect();
    match slices.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
