//! Weight and attribute extraction from a matched cell

use crate::graph::GraphContext;
use crate::pattern::CellMatch;
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::NodeProto;
use crate::tensor::FloatArray;
use crate::transformers::common::{
    get_attr_f, get_attr_i, get_attr_s, get_constant_int, get_constant_tensor,
};

use super::cell::CellVariant;
use super::DeclineReason;

/// `LSTMBlockCell` defaults when an attribute is absent
pub const DEFAULT_FORGET_BIAS: f32 = 1.0;
/// Default `cell_clip`; positive, so a cell without the attribute is declined
pub const DEFAULT_CELL_CLIP: f32 = 3.0;
/// Only `BiasAdd` layout the kernel/bias relation holds for
pub const NHWC: &str = "NHWC";

/// Split slot each gate reads; TF packs the gate axis as i, c, f, o
const GATE_SLOTS: [(&str, usize); 4] = [("it", 0), ("gt", 1), ("ft", 2), ("ot", 3)];

/// A constant parameter of the cell
#[derive(Debug, Clone, PartialEq)]
pub struct RnnWeight {
    /// Value the cell read it through, or `None` for attribute-borne values
    pub value_id: Option<String>,
    /// Producer of the constant, if it is not an initializer
    pub node: Option<String>,
    /// The data
    pub value: FloatArray,
}

impl RnnWeight {
    /// Element type
    pub fn dtype(&self) -> DataType {
        self.value.dtype()
    }
}

/// Kernel, bias and forget bias of one cell
#[derive(Debug, Clone, PartialEq)]
pub struct RnnWeights {
    /// Combined gate kernel `[input + hidden, 4H]`
    pub kernel: RnnWeight,
    /// Combined gate bias `[4H]`
    pub bias: RnnWeight,
    /// Forget-gate offset, scalar or `[H]`
    pub forget_bias: RnnWeight,
}

impl RnnWeights {
    /// Number of hidden units
    pub fn hidden_size(&self) -> usize {
        self.bias.value.shape()[0] / 4
    }

    /// Number of input features
    pub fn input_size(&self) -> usize {
        self.kernel.value.shape()[0] - self.hidden_size()
    }
}

/// Read the constant bound to `role`
fn constant_weight(
    ctx: &GraphContext,
    m: &CellMatch,
    role: &'static str,
) -> Result<RnnWeight, DeclineReason> {
    let binding = m.get(role).ok_or(DeclineReason::NonConstantWeight(role))?;
    let tensor =
        get_constant_tensor(ctx, &binding.value).ok_or(DeclineReason::NonConstantWeight(role))?;
    let value = FloatArray::from_tensor(tensor).map_err(|e| DeclineReason::MalformedWeight {
        role,
        message: e.to_string(),
    })?;

    Ok(RnnWeight {
        value_id: Some(binding.value.clone()),
        node: binding.node.clone(),
        value,
    })
}

fn matched_node<'g>(
    ctx: &'g GraphContext,
    m: &CellMatch,
    role: &'static str,
) -> Result<&'g NodeProto, DeclineReason> {
    m.node(ctx, role).ok_or(DeclineReason::MissingRole(role))
}

/// Extract kernel, bias and forget bias for `variant`
pub fn extract_weights(
    ctx: &GraphContext,
    variant: CellVariant,
    m: &CellMatch,
) -> Result<RnnWeights, DeclineReason> {
    let kernel = constant_weight(ctx, m, "cell_kernel")?;
    let bias = constant_weight(ctx, m, "cell_bias")?;

    let forget_bias = match variant {
        CellVariant::LstmCell => {
            check_gate_wiring(ctx, m)?;

            let bias_add = matched_node(ctx, m, "bias_add")?;
            let data_format = get_attr_s(bias_add, "data_format").unwrap_or(NHWC);
            if data_format != NHWC {
                return Err(DeclineReason::DataFormat(data_format.to_string()));
            }

            let forget_bias = constant_weight(ctx, m, "ft_bias")?;
            if forget_bias.dtype() != bias.dtype() {
                return Err(DeclineReason::ForgetBiasDtype {
                    forget: forget_bias.dtype() as i32,
                    bias: bias.dtype() as i32,
                });
            }
            forget_bias
        }
        CellVariant::LstmBlockCell => {
            let block = matched_node(ctx, m, "lstm_block_cell")?;
            let value = get_attr_f(block, "forget_bias").unwrap_or(DEFAULT_FORGET_BIAS);
            let value = FloatArray::scalar(f64::from(value), bias.dtype()).map_err(|e| {
                DeclineReason::MalformedWeight {
                    role: "forget_bias",
                    message: e.to_string(),
                }
            })?;
            RnnWeight {
                value_id: None,
                node: Some(block.name.clone()),
                value,
            }
        }
    };

    check_shapes(&kernel, &bias, &forget_bias)?;

    Ok(RnnWeights {
        kernel,
        bias,
        forget_bias,
    })
}

/// Require the gates to read their own slot of a split over the gate axis
fn check_gate_wiring(ctx: &GraphContext, m: &CellMatch) -> Result<(), DeclineReason> {
    let split = matched_node(ctx, m, "gates")?;
    let axis = split.input.first().and_then(|a| get_constant_int(ctx, a));
    if !matches!(axis, Some(1) | Some(-1)) {
        return Err(DeclineReason::SplitAxis(axis));
    }

    for (gate, slot) in GATE_SLOTS {
        let node = matched_node(ctx, m, gate)?;
        let expected = split
            .output
            .get(slot)
            .ok_or(DeclineReason::GateSlot { gate, slot })?;
        let reads_slot = |n: &NodeProto| n.input.iter().any(|i| i == expected);

        // The forget gate reads its slot through the forget-bias add
        let wired = reads_slot(node)
            || (gate == "ft"
                && node
                    .input
                    .first()
                    .and_then(|v| ctx.get_producer(v))
                    .is_some_and(reads_slot));
        if !wired {
            return Err(DeclineReason::GateSlot { gate, slot });
        }
    }
    Ok(())
}

fn check_shapes(
    kernel: &RnnWeight,
    bias: &RnnWeight,
    forget_bias: &RnnWeight,
) -> Result<(), DeclineReason> {
    if kernel.dtype() != bias.dtype() {
        return Err(DeclineReason::KernelBiasDtype {
            kernel: kernel.dtype() as i32,
            bias: bias.dtype() as i32,
        });
    }

    let kernel_shape = kernel.value.shape();
    let bias_shape = bias.value.shape();
    if kernel_shape.len() != 2 {
        return Err(DeclineReason::Rank {
            role: "cell_kernel",
            rank: kernel_shape.len(),
            expected: 2,
        });
    }
    if bias_shape.len() != 1 {
        return Err(DeclineReason::Rank {
            role: "cell_bias",
            rank: bias_shape.len(),
            expected: 1,
        });
    }
    if bias_shape[0] != kernel_shape[1] {
        return Err(DeclineReason::BiasKernelMismatch {
            bias: bias_shape[0],
            kernel: kernel_shape[1],
        });
    }
    if bias_shape[0] == 0 || bias_shape[0] % 4 != 0 {
        return Err(DeclineReason::GateAxisNotDivisible(bias_shape[0]));
    }

    let hidden_size = bias_shape[0] / 4;
    if kernel_shape[0] <= hidden_size {
        return Err(DeclineReason::NoInputFeatures {
            rows: kernel_shape[0],
            hidden_size,
        });
    }

    let forget_shape = forget_bias.value.shape();
    let forget_len: usize = forget_shape.iter().product();
    let per_unit = forget_shape.len() == 1 && forget_shape[0] == hidden_size;
    if forget_len != 1 && !per_unit {
        return Err(DeclineReason::ForgetBiasShape(forget_shape.to_vec()));
    }

    Ok(())
}

/// Reject cell attributes the fused op cannot express
pub fn check_attributes(
    ctx: &GraphContext,
    variant: CellVariant,
    m: &CellMatch,
) -> Result<(), DeclineReason> {
    match variant {
        CellVariant::LstmCell => Ok(()),
        CellVariant::LstmBlockCell => {
            let block = matched_node(ctx, m, "lstm_block_cell")?;
            let cell_clip = get_attr_f(block, "cell_clip").unwrap_or(DEFAULT_CELL_CLIP);
            if cell_clip > 0.0 {
                return Err(DeclineReason::CellClip(cell_clip));
            }
            if get_attr_i(block, "use_peephole").unwrap_or(0) != 0 {
                return Err(DeclineReason::Peephole);
            }
            Ok(())
        }
    }
}
