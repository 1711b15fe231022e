//! LSTM loop lowering
//!
//! Replaces a while loop whose body computes one LSTM step with a single
//! ONNX `LSTM` node that consumes the whole input sequence.
//!
//! A rewrite proceeds in two phases. The first only reads the graph:
//!
//! 1. find the one cell in the body ([`cell`])
//! 2. extract and check its parameters ([`weights`])
//! 3. resolve how `c` and `h` are carried ([`state`])
//! 4. check the loop has no work the fused op would drop
//!
//! Any failure here leaves the graph untouched and yields a
//! [`DeclineReason`]. The second phase builds the fused op ([`build`]) and
//! redirects the loop's exits to it ([`connect`]). The dead loop is left
//! for [`GraphContext::eliminate_dead_nodes`].
//!
//! # Example
//!
//! ```ignore
//! use rnn_lowering::transformers::lstm::{LstmRewriter, RewriteOutcome};
//!
//! let rewriter = LstmRewriter::new().with_loops(loops);
//! let result = rewriter.transform(&mut ctx)?;
//! ctx.eliminate_dead_nodes();
//! ```

#![allow(missing_docs)]

pub mod build;
pub mod cell;
pub mod connect;
pub mod context;
pub mod relayout;
pub mod state;
pub mod weights;

#[cfg(test)]
pub(crate) mod tests;

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::error::OnnxResult;
use crate::graph::GraphContext;
use crate::loops::LoopProperties;
use crate::pattern::{is_select_op, CellMatch};

use super::common::{OnnxTransformer, TransformResult};

pub use cell::{find_cell, CellVariant};
pub use context::{LstmInput, RewriteContext};
pub use relayout::{relayout, relayout_weights, Gate, LstmParams, RelaidWeights};
pub use state::{resolve_state, StateBinding};
pub use weights::{check_attributes, extract_weights, RnnWeight, RnnWeights};

/// Why a loop was left as it is
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeclineReason {
    /// No cell variant matches exactly once in the body
    #[error("no LSTM cell in loop body")]
    NoCellMatch,

    /// A weight role is not bound to a constant
    #[error("{0} is not a constant")]
    NonConstantWeight(&'static str),

    /// A weight constant could not be read
    #[error("{role} is unreadable: {message}")]
    MalformedWeight {
        role: &'static str,
        message: String,
    },

    /// A matched role is not backed by a node
    #[error("role {0} has no node")]
    MissingRole(&'static str),

    /// `BiasAdd` uses a layout other than NHWC
    #[error("unsupported BiasAdd data_format {0}")]
    DataFormat(String),

    /// Forget bias and bias element types differ
    #[error("forget bias dtype {forget} differs from bias dtype {bias}")]
    ForgetBiasDtype { forget: i32, bias: i32 },

    /// Kernel and bias element types differ
    #[error("kernel dtype {kernel} differs from bias dtype {bias}")]
    KernelBiasDtype { kernel: i32, bias: i32 },

    /// A weight has the wrong rank
    #[error("{role} has rank {rank}, expected {expected}")]
    Rank {
        role: &'static str,
        rank: usize,
        expected: usize,
    },

    /// Bias length differs from the kernel's gate axis
    #[error("bias length {bias} differs from kernel columns {kernel}")]
    BiasKernelMismatch { bias: usize, kernel: usize },

    /// The gate axis does not hold four equal gates
    #[error("gate axis of {0} is not a positive multiple of 4")]
    GateAxisNotDivisible(usize),

    /// The kernel has no rows left for the input
    #[error("kernel has {rows} rows, not more than hidden size {hidden_size}")]
    NoInputFeatures { rows: usize, hidden_size: usize },

    /// The gate split does not cut the gate axis
    #[error("gate split axis {0:?} is not the last axis")]
    SplitAxis(Option<i64>),

    /// A gate reads a split slot other than its own
    #[error("gate {gate} does not read split output {slot}")]
    GateSlot { gate: &'static str, slot: usize },

    /// Forget bias is neither a scalar nor one value per unit
    #[error("forget bias shape {0:?} is neither scalar nor per-unit")]
    ForgetBiasShape(Vec<usize>),

    /// `cell_clip` is enabled; the fused op has no equivalent
    #[error("cell_clip {0} is enabled")]
    CellClip(f32),

    /// Peephole connections are enabled
    #[error("peephole connections are enabled")]
    Peephole,

    /// Neither split nor shared state resolved
    #[error("cell and hidden state are not loop variables")]
    StateUnresolved,

    /// The loop carries more than the cell state and bookkeeping
    #[error("{extra} extra state variables exceed the limit of {limit}")]
    TooManyStateVariables { extra: usize, limit: usize },

    /// The loop writes more sequences than the fused op produces
    #[error("{count} scan outputs exceed the limit of {limit}")]
    TooManyScanOutputs { count: usize, limit: usize },

    /// A scan output is not the hidden state
    #[error("scan output {0} is not the hidden state")]
    ScanOutputNotHidden(String),

    /// The loop does not read exactly one sequence
    #[error("expected one scan input, found {0}")]
    ScanInputCount(usize),

    /// The cell does not read the scanned step
    #[error("cell does not read the scanned input")]
    CellInputNotScanned,
}

/// Result of one rewrite attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// The loop was lowered; `node` names the new `LSTM`
    Rewritten { node: String },
    /// The loop was left untouched
    Declined(DeclineReason),
}

impl RewriteOutcome {
    /// Whether the loop was lowered
    pub fn is_rewritten(&self) -> bool {
        matches!(self, RewriteOutcome::Rewritten { .. })
    }
}

/// Lower LSTM while loops to ONNX `LSTM`
#[derive(Debug, Clone)]
pub struct LstmRewriter {
    /// Loop variables allowed besides the cell's own (time step, counters)
    pub max_extra_state_variables: usize,
    /// Sequences the loop may write
    pub max_scan_outputs: usize,
    /// Loops to rewrite when run as a transformer
    pub loops: Vec<LoopProperties>,
}

impl Default for LstmRewriter {
    fn default() -> Self {
        Self {
            max_extra_state_variables: 2,
            max_scan_outputs: 1,
            loops: Vec::new(),
        }
    }
}

impl LstmRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_extra_state_variables(mut self, limit: usize) -> Self {
        self.max_extra_state_variables = limit;
        self
    }

    pub fn with_max_scan_outputs(mut self, limit: usize) -> Self {
        self.max_scan_outputs = limit;
        self
    }

    pub fn with_loops(mut self, loops: Vec<LoopProperties>) -> Self {
        self.loops = loops;
        self
    }

    /// Rewrite one loop
    ///
    /// A declined rewrite leaves the graph unchanged. Errors mean the graph
    /// broke an assumption after the rewrite had started.
    pub fn rewrite_loop(
        &self,
        ctx: &mut GraphContext,
        loop_props: &LoopProperties,
    ) -> OnnxResult<RewriteOutcome> {
        trace!(loop_name = %loop_props.name, "attempting LSTM rewrite");

        let mut rctx = match self.prepare(ctx, loop_props) {
            Ok(rctx) => rctx,
            Err(reason) => {
                debug!(loop_name = %loop_props.name, %reason, "LSTM rewrite declined");
                return Ok(RewriteOutcome::Declined(reason));
            }
        };

        let relaid = relayout_weights(&rctx.weights)?;
        build::add_weight_constants(ctx, &mut rctx, &relaid);
        build::add_sequence_lens(ctx, &mut rctx);
        build::add_initial_states(ctx, &mut rctx)?;
        let lstm = build::create_lstm_node(ctx, &mut rctx)?;
        connect::connect_outputs(ctx, &mut rctx, &lstm)?;

        info!(
            loop_name = %loop_props.name,
            node = %lstm.name,
            variant = rctx.variant.name(),
            state = rctx.state.kind(),
            hidden_size = rctx.hidden_size,
            input_size = rctx.input_size,
            "lowered loop to LSTM"
        );
        Ok(RewriteOutcome::Rewritten { node: lstm.name })
    }

    /// Everything that can decline, without touching the graph
    fn prepare<'l>(
        &self,
        ctx: &GraphContext,
        loop_props: &'l LoopProperties,
    ) -> Result<RewriteContext<'l>, DeclineReason> {
        let body = loop_props.body_nodes(ctx);
        let (variant, cell) = find_cell(ctx, &body).ok_or(DeclineReason::NoCellMatch)?;
        trace!(loop_name = %loop_props.name, variant = variant.name(), "cell matched");

        let weights = extract_weights(ctx, variant, &cell)?;
        check_attributes(ctx, variant, &cell)?;

        let state = resolve_state(ctx, loop_props, variant, &cell)
            .ok_or(DeclineReason::StateUnresolved)?;
        self.check_loop_shape(loop_props, &state)?;

        let x = scanned_input(ctx, loop_props, variant, &cell)?;
        let scan_output_exits = hidden_scan_exits(ctx, loop_props, variant, &cell)?;

        let mut rctx = RewriteContext::new(loop_props, variant, cell, weights, state, &x);
        rctx.scan_output_exits = scan_output_exits;
        Ok(rctx)
    }

    fn check_loop_shape(
        &self,
        loop_props: &LoopProperties,
        state: &StateBinding,
    ) -> Result<(), DeclineReason> {
        let extra = loop_props
            .state_variables
            .len()
            .saturating_sub(state.variable_count());
        if extra > self.max_extra_state_variables {
            return Err(DeclineReason::TooManyStateVariables {
                extra,
                limit: self.max_extra_state_variables,
            });
        }

        let count = loop_props.scan_outputs.len();
        if count > self.max_scan_outputs {
            return Err(DeclineReason::TooManyScanOutputs {
                count,
                limit: self.max_scan_outputs,
            });
        }
        Ok(())
    }
}

/// The whole sequence the cell reads one step of
fn scanned_input(
    ctx: &GraphContext,
    loop_props: &LoopProperties,
    variant: CellVariant,
    cell: &CellMatch,
) -> Result<String, DeclineReason> {
    let scan = match loop_props.scan_inputs.as_slice() {
        [only] => only,
        inputs => return Err(DeclineReason::ScanInputCount(inputs.len())),
    };

    let reads_step = match variant {
        CellVariant::LstmCell => cell
            .node(ctx, "xh")
            .is_some_and(|xh| xh.input.contains(&scan.iteration_output)),
        CellVariant::LstmBlockCell => cell
            .node(ctx, "lstm_block_cell")
            .and_then(|block| block.input.get(cell::block_inputs::X))
            .is_some_and(|x| *x == scan.iteration_output),
    };
    if !reads_step {
        return Err(DeclineReason::CellInputNotScanned);
    }
    Ok(scan.enter_input_id.clone())
}

/// Exits of the scan outputs, all of which must stack the hidden state
///
/// A step value counts as the hidden state when it is the hidden state or
/// a `Select` reading it.
fn hidden_scan_exits(
    ctx: &GraphContext,
    loop_props: &LoopProperties,
    variant: CellVariant,
    cell: &CellMatch,
) -> Result<Vec<String>, DeclineReason> {
    let hidden = state::hidden_state_value(ctx, variant, cell);

    let mut exits = Vec::new();
    for scan in &loop_props.scan_outputs {
        let step = scan.iteration_input.as_str();
        let is_hidden = hidden.is_some_and(|h| {
            step == h
                || ctx.get_producer(step).is_some_and(|p| {
                    is_select_op(&p.op_type) && p.input.iter().any(|i| i == h)
                })
        });
        if !is_hidden {
            return Err(DeclineReason::ScanOutputNotHidden(step.to_string()));
        }
        exits.extend(scan.exit_output.clone());
    }
    Ok(exits)
}

impl OnnxTransformer for LstmRewriter {
    fn name(&self) -> &'static str {
        "LstmRewriter"
    }

    fn transform(&self, ctx: &mut GraphContext) -> OnnxResult<TransformResult> {
        let mut result = TransformResult::new();

        for loop_props in &self.loops {
            match self.rewrite_loop(ctx, loop_props)? {
                RewriteOutcome::Rewritten { node } => {
                    result.patterns_matched += 1;
                    result.record(&node);
                }
                RewriteOutcome::Declined(DeclineReason::NoCellMatch) => {}
                RewriteOutcome::Declined(_) => result.patterns_matched += 1,
            }
        }

        Ok(result)
    }

    fn is_applicable(&self, _ctx: &GraphContext) -> bool {
        !self.loops.is_empty()
    }
}
