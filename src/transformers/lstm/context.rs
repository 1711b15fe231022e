//! Working record of one rewrite attempt

use rustc_hash::{FxHashMap, FxHashSet};

use crate::loops::LoopProperties;
use crate::pattern::CellMatch;
use crate::proto::{AttributeProto, NodeProto};

use super::cell::CellVariant;
use super::state::StateBinding;
use super::weights::RnnWeights;

/// Operands of the fused `LSTM` op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LstmInput {
    /// Input sequence `[seq, batch, input]`
    X,
    /// Input weights
    W,
    /// Recurrent weights
    R,
    /// Bias
    B,
    /// Per-batch sequence lengths (optional)
    SequenceLens,
    /// Initial hidden state (optional)
    InitialH,
    /// Initial cell state (optional)
    InitialC,
}

impl LstmInput {
    /// Operands in `LSTM` input order
    pub const OPERAND_ORDER: [LstmInput; 7] = [
        LstmInput::X,
        LstmInput::W,
        LstmInput::R,
        LstmInput::B,
        LstmInput::SequenceLens,
        LstmInput::InitialH,
        LstmInput::InitialC,
    ];

    /// Canonical operand name
    pub fn name(self) -> &'static str {
        match self {
            LstmInput::X => "X",
            LstmInput::W => "W",
            LstmInput::R => "R",
            LstmInput::B => "B",
            LstmInput::SequenceLens => "sequence_lens",
            LstmInput::InitialH => "initial_h",
            LstmInput::InitialC => "initial_c",
        }
    }
}

/// State of one rewrite attempt from match to reconnection
#[derive(Debug, Clone)]
pub struct RewriteContext<'l> {
    /// The loop being rewritten
    pub loop_props: &'l LoopProperties,
    /// Matched cell variant
    pub variant: CellVariant,
    /// Role bindings of the matched cell
    pub cell: CellMatch,
    /// Extracted parameters
    pub weights: RnnWeights,
    /// How c and h are carried
    pub state: StateBinding,
    /// Number of hidden units
    pub hidden_size: usize,
    /// Number of input features
    pub input_size: usize,
    /// Attributes of the fused op
    pub attributes: Vec<AttributeProto>,
    /// Operand → value
    pub inputs: FxHashMap<LstmInput, String>,
    /// Stacked per-step outputs to reconnect to `Y`
    pub scan_output_exits: Vec<String>,
    /// Nodes created by this rewrite; never retargeted by it
    pub created: FxHashSet<String>,
}

impl<'l> RewriteContext<'l> {
    /// Start a rewrite of `loop_props` reading its sequence from `x`
    pub fn new(
        loop_props: &'l LoopProperties,
        variant: CellVariant,
        cell: CellMatch,
        weights: RnnWeights,
        state: StateBinding,
        x: &str,
    ) -> Self {
        let hidden_size = weights.hidden_size();
        let input_size = weights.input_size();
        let mut inputs = FxHashMap::default();
        inputs.insert(LstmInput::X, x.to_string());

        Self {
            loop_props,
            variant,
            cell,
            weights,
            state,
            hidden_size,
            input_size,
            attributes: Vec::new(),
            inputs,
            scan_output_exits: Vec::new(),
            created: FxHashSet::default(),
        }
    }

    /// Bind an operand
    pub fn set_input(&mut self, input: LstmInput, value: String) {
        self.inputs.insert(input, value);
    }

    /// Value bound to an operand, empty when unbound
    pub fn input(&self, input: LstmInput) -> &str {
        self.inputs.get(&input).map(String::as_str).unwrap_or("")
    }

    /// All operands in `LSTM` input order
    pub fn operands(&self) -> Vec<&str> {
        LstmInput::OPERAND_ORDER
            .iter()
            .map(|&input| self.input(input))
            .collect()
    }

    /// Remember a node created by this rewrite
    pub fn record_node(&mut self, node: &NodeProto) {
        self.created.insert(node.name.clone());
    }

    /// Hidden size as an ONNX dimension
    pub fn hidden_dim(&self) -> i64 {
        self.hidden_size as i64
    }
}
