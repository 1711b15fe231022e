//! Reconnection of the loop's outputs to the fused op
//!
//! Every loop exit that something reads is redirected to the matching
//! `LSTM` output, with the direction axis squeezed away. The loop itself
//! is left in place for dead-node elimination.

use tracing::trace;

use crate::error::{OnnxResult, TransformError};
use crate::graph::{GraphContext, OutputType};
use crate::proto::{AttributeProto, NodeProto};

use super::build::{output_elem_type, sequence_dims};
use super::context::RewriteContext;
use super::state::StateBinding;

/// `LSTM` output slots
mod lstm_outputs {
    pub const Y: usize = 0;
    pub const Y_H: usize = 1;
    pub const Y_C: usize = 2;
}

/// Redirect the loop's state and scan exits to `lstm`
pub fn connect_outputs(
    ctx: &mut GraphContext,
    rctx: &mut RewriteContext<'_>,
    lstm: &NodeProto,
) -> OnnxResult<()> {
    let output = |slot: usize| {
        lstm.output.get(slot).cloned().ok_or_else(|| {
            TransformError::InvalidNode(format!("{} has no output {}", lstm.name, slot))
        })
    };
    let y = output(lstm_outputs::Y)?;
    let y_h = output(lstm_outputs::Y_H)?;
    let y_c = output(lstm_outputs::Y_C)?;

    let (seq, batch) = sequence_dims(ctx, rctx);
    let elem_type = output_elem_type(ctx, rctx);
    let hidden = rctx.hidden_dim();

    match rctx.state.clone() {
        StateBinding::Split { ct, ht } => {
            let state_type = OutputType::new(elem_type, vec![batch, hidden]);
            if let Some(exit) = ht.exit_output.as_deref() {
                squeeze_into(ctx, rctx, &y_h, 0, state_type.clone(), exit);
            }
            if let Some(exit) = ct.exit_output.as_deref() {
                squeeze_into(ctx, rctx, &y_c, 0, state_type, exit);
            }
        }
        StateBinding::Shared { ct_ht } => {
            if let Some(exit) = ct_ht.exit_output.as_deref() {
                let concat = ctx.make_node(
                    "Concat",
                    &[y_c.as_str(), y_h.as_str()],
                    vec![AttributeProto::new_int("axis", 2)],
                    1,
                    &[OutputType::new(elem_type, vec![1, batch, 2 * hidden])],
                );
                rctx.record_node(&concat);
                squeeze_into(
                    ctx,
                    rctx,
                    &concat.output[0],
                    0,
                    OutputType::new(elem_type, vec![batch, 2 * hidden]),
                    exit,
                );
            }
        }
    }

    let sequence_type = OutputType::new(elem_type, vec![seq, batch, hidden]);
    for exit in rctx.scan_output_exits.clone() {
        squeeze_into(ctx, rctx, &y, 1, sequence_type.clone(), &exit);
    }

    Ok(())
}

/// Squeeze `axis` off `value` and move every reader of `exit` onto the result
fn squeeze_into(
    ctx: &mut GraphContext,
    rctx: &mut RewriteContext<'_>,
    value: &str,
    axis: i64,
    output_type: OutputType,
    exit: &str,
) {
    let squeeze = ctx.make_node(
        "Squeeze",
        &[value],
        vec![AttributeProto::new_ints("axes", vec![axis])],
        1,
        &[output_type],
    );
    rctx.record_node(&squeeze);

    let moved = ctx.replace_all_inputs(exit, &squeeze.output[0], &rctx.created);
    trace!(exit, source = value, moved, "loop exit reconnected");
}

