//! LSTM cell variants and their structural patterns

use tracing::trace;

use crate::graph::GraphContext;
use crate::pattern::{CellMatch, OpPattern, PatternMatcher};
use crate::proto::NodeProto;

/// Supported cell decompositions, in matching priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellVariant {
    /// Cell spelled out with MatMul/BiasAdd/Split and elementwise gates
    LstmCell,
    /// A single `LSTMBlockCell` op
    LstmBlockCell,
}

impl CellVariant {
    /// Variants in the order they are tried
    pub const PRIORITY: [CellVariant; 2] = [CellVariant::LstmCell, CellVariant::LstmBlockCell];

    /// Name for logs
    pub fn name(self) -> &'static str {
        match self {
            CellVariant::LstmCell => "LSTMCell",
            CellVariant::LstmBlockCell => "LSTMBlockCell",
        }
    }

    /// Structural pattern rooted at the node producing the new hidden state
    pub fn pattern(self) -> OpPattern {
        match self {
            CellVariant::LstmCell => lstm_cell_pattern(),
            CellVariant::LstmBlockCell => lstm_block_cell_pattern(),
        }
    }
}

/// Output slots of `LSTMBlockCell`: i, cs, f, o, ci, co, h
pub mod block_outputs {
    /// New cell state
    pub const CS: usize = 1;
    /// New hidden state
    pub const H: usize = 6;
}

/// Input slots of `LSTMBlockCell`: x, cs_prev, h_prev, w, wci, wcf, wco, b
pub mod block_inputs {
    /// Per-step input
    pub const X: usize = 0;
}

/// The four gate pre-activations, `Split(axis, BiasAdd(MatMul(xh, W), b))`
///
/// Every gate refers back to the same split through the `gates` role.
fn gates() -> OpPattern {
    OpPattern::new("Split").role("gates").inputs(vec![
        OpPattern::any(),
        OpPattern::new("BiasAdd").role("bias_add").inputs(vec![
            OpPattern::new("MatMul").inputs(vec![
                OpPattern::new("ConcatV2|Concat").role("xh"),
                OpPattern::new("Enter").inputs(vec![OpPattern::any().role("cell_kernel")]),
            ]),
            OpPattern::new("Enter").inputs(vec![OpPattern::any().role("cell_bias")]),
        ]),
    ])
}

fn lstm_cell_pattern() -> OpPattern {
    let forget = OpPattern::new("Sigmoid").role("ft").inputs(vec![
        OpPattern::new("Add|AddV2").inputs(vec![gates(), OpPattern::any().role("ft_bias")]),
    ]);
    let kept = OpPattern::new("Mul")
        .role("ct_identity_consumer")
        .inputs(vec![forget, OpPattern::any()]);
    let update = OpPattern::new("Mul").inputs(vec![
        OpPattern::new("Sigmoid").role("it").inputs(vec![gates()]),
        OpPattern::new("Tanh").role("gt").inputs(vec![gates()]),
    ]);
    let cell_state = OpPattern::new("Add|AddV2").role("ct").inputs(vec![kept, update]);

    OpPattern::new("Mul").role("ht").inputs(vec![
        OpPattern::new("Sigmoid").role("ot").inputs(vec![gates()]),
        OpPattern::new("Tanh").inputs(vec![cell_state]),
    ])
}

fn lstm_block_cell_pattern() -> OpPattern {
    OpPattern::new("LSTMBlockCell")
        .role("lstm_block_cell")
        .inputs(vec![
            OpPattern::any(),
            OpPattern::any(),
            OpPattern::any(),
            OpPattern::new("Enter").inputs(vec![OpPattern::any().role("cell_kernel")]),
            OpPattern::any(),
            OpPattern::any(),
            OpPattern::any(),
            OpPattern::new("Enter").inputs(vec![OpPattern::any().role("cell_bias")]),
        ])
}

/// Find the single cell in a loop body
///
/// Variants are tried in priority order; the first one matching exactly
/// once wins.
pub fn find_cell(ctx: &GraphContext, body: &[&NodeProto]) -> Option<(CellVariant, CellMatch)> {
    let matcher = PatternMatcher::new(ctx);
    for variant in CellVariant::PRIORITY {
        let mut matches = matcher.find_all(body.iter().copied(), &variant.pattern());
        trace!(variant = variant.name(), matches = matches.len(), "cell pattern attempt");
        if matches.len() == 1 {
            return matches.pop().map(|m| (variant, m));
        }
    }
    None
}
