//! Construction of the fused `LSTM` node and its operands

use tracing::trace;

use crate::error::{OnnxResult, TransformError};
use crate::graph::{GraphContext, OutputType};
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::{AttributeProto, NodeProto};
use crate::tensor::dim_or_unknown;
use crate::transformers::common::get_constant_tensor;

use super::context::{LstmInput, RewriteContext};
use super::relayout::RelaidWeights;
use super::state::StateBinding;

/// Batch size and sequence length read off `X`, `-1` when unknown
pub(crate) fn sequence_dims(ctx: &GraphContext, rctx: &RewriteContext<'_>) -> (i64, i64) {
    let shape = ctx.get_tensor_shape(rctx.input(LstmInput::X));
    let seq = dim_or_unknown(shape.as_deref(), 0);
    let batch = dim_or_unknown(shape.as_deref(), 1);
    (seq, batch)
}

/// Element type of the fused op's outputs
pub(crate) fn output_elem_type(ctx: &GraphContext, rctx: &RewriteContext<'_>) -> i32 {
    ctx.get_tensor_elem_type(rctx.input(LstmInput::X))
        .unwrap_or(rctx.weights.kernel.dtype() as i32)
}

/// Register `W`, `R` and `B` as constants
pub fn add_weight_constants(
    ctx: &mut GraphContext,
    rctx: &mut RewriteContext<'_>,
    relaid: &RelaidWeights,
) {
    for (input, value) in [
        (LstmInput::W, &relaid.w),
        (LstmInput::R, &relaid.r),
        (LstmInput::B, &relaid.b),
    ] {
        let name = ctx.make_const(input.name(), value.to_tensor(input.name()));
        trace!(operand = input.name(), value = %name, shape = ?value.shape(), "weight constant");
        rctx.set_input(input, name);
    }
}

/// Feed the loop's sequence lengths as `int32`, when it has them
pub fn add_sequence_lens(ctx: &mut GraphContext, rctx: &mut RewriteContext<'_>) {
    let Some(length) = rctx.loop_props.sequence_length.as_deref() else {
        return;
    };

    let (_, batch) = sequence_dims(ctx, rctx);
    let cast = ctx.make_node(
        "Cast",
        &[length],
        vec![AttributeProto::new_int("to", DataType::Int32 as i64)],
        1,
        &[OutputType::new(DataType::Int32 as i32, vec![batch])],
    );
    rctx.record_node(&cast);
    rctx.set_input(LstmInput::SequenceLens, cast.output[0].clone());
}

/// Feed the loop's initial states as `initial_c` / `initial_h`
///
/// The fused op wants a leading direction axis on both.
pub fn add_initial_states(ctx: &mut GraphContext, rctx: &mut RewriteContext<'_>) -> OnnxResult<()> {
    match rctx.state.clone() {
        StateBinding::Split { ct, ht } => {
            let initial_c = unsqueeze_initial(ctx, rctx, &ct.enter_input_id, LstmInput::InitialC);
            let initial_h = unsqueeze_initial(ctx, rctx, &ht.enter_input_id, LstmInput::InitialH);
            rctx.set_input(LstmInput::InitialC, initial_c);
            rctx.set_input(LstmInput::InitialH, initial_h);
        }
        StateBinding::Shared { ct_ht } => {
            let (initial_c, initial_h) = split_shared_initial(ctx, rctx, &ct_ht.enter_input_id)?;
            rctx.set_input(LstmInput::InitialC, initial_c);
            rctx.set_input(LstmInput::InitialH, initial_h);
        }
    }
    Ok(())
}

/// Give one initial state its direction axis
///
/// A constant is replaced by a reshaped copy. Anything else gets an
/// `Unsqueeze`, and other readers of the original value are moved to it.
fn unsqueeze_initial(
    ctx: &mut GraphContext,
    rctx: &mut RewriteContext<'_>,
    value: &str,
    input: LstmInput,
) -> String {
    if let Some(tensor) = get_constant_tensor(ctx, value) {
        let mut tensor = tensor.clone();
        tensor.dims.insert(0, 1);
        return ctx.make_const(input.name(), tensor);
    }

    let (_, batch) = sequence_dims(ctx, rctx);
    let elem_type = output_elem_type(ctx, rctx);
    let unsqueeze = ctx.make_node(
        "Unsqueeze",
        &[value],
        vec![AttributeProto::new_ints("axes", vec![0])],
        1,
        &[OutputType::new(elem_type, vec![1, batch, rctx.hidden_dim()])],
    );
    rctx.record_node(&unsqueeze);

    let output = unsqueeze.output[0].clone();
    let moved = ctx.replace_all_inputs(value, &output, &rctx.created);
    trace!(value, replacement = %output, moved, "initial state unsqueezed");
    output
}

/// Split a combined `[batch, 2H]` initial state into `c` then `h`
fn split_shared_initial(
    ctx: &mut GraphContext,
    rctx: &mut RewriteContext<'_>,
    value: &str,
) -> OnnxResult<(String, String)> {
    let (_, batch) = sequence_dims(ctx, rctx);
    let elem_type = output_elem_type(ctx, rctx);
    let hidden = rctx.hidden_dim();

    let half = OutputType::new(elem_type, vec![batch, hidden]);
    let split = ctx.make_node(
        "Split",
        &[value],
        vec![
            AttributeProto::new_int("axis", 1),
            AttributeProto::new_ints("split", vec![hidden, hidden]),
        ],
        2,
        &[half.clone(), half],
    );
    rctx.record_node(&split);

    let mut halves = Vec::with_capacity(split.output.len());
    for half in &split.output {
        let unsqueeze = ctx.make_node(
            "Unsqueeze",
            &[half.as_str()],
            vec![AttributeProto::new_ints("axes", vec![0])],
            1,
            &[OutputType::new(elem_type, vec![1, batch, hidden])],
        );
        rctx.record_node(&unsqueeze);
        halves.push(unsqueeze.output[0].clone());
    }

    match <[String; 2]>::try_from(halves) {
        Ok([initial_c, initial_h]) => Ok((initial_c, initial_h)),
        Err(halves) => Err(TransformError::Internal(format!(
            "split of {} produced {} halves",
            value,
            halves.len()
        ))),
    }
}

/// Create the `LSTM` node from the bound operands
///
/// Outputs are `Y [seq, 1, batch, H]`, `Y_h [1, batch, H]` and
/// `Y_c [1, batch, H]`.
pub fn create_lstm_node(
    ctx: &mut GraphContext,
    rctx: &mut RewriteContext<'_>,
) -> OnnxResult<NodeProto> {
    let (seq, batch) = sequence_dims(ctx, rctx);
    let elem_type = output_elem_type(ctx, rctx);
    let hidden = rctx.hidden_dim();

    rctx.attributes = vec![
        AttributeProto::new_string("direction", "forward"),
        AttributeProto::new_int("hidden_size", hidden),
    ];

    let operands = rctx.operands();
    let lstm = ctx.make_node(
        "LSTM",
        &operands,
        rctx.attributes.clone(),
        3,
        &[
            OutputType::new(elem_type, vec![seq, 1, batch, hidden]),
            OutputType::new(elem_type, vec![1, batch, hidden]),
            OutputType::new(elem_type, vec![1, batch, hidden]),
        ],
    );
    rctx.record_node(&lstm);
    Ok(lstm)
}
