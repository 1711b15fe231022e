//! Gate relayout of trained LSTM parameters
//!
//! The source cell keeps one kernel `[input + hidden, 4H]` and one bias
//! `[4H]`, both with gate blocks ordered input, cell, forget, output along
//! the last axis. The fused op wants per-direction tensors with gates
//! ordered input, output, forget, cell along the leading gate axis:
//!
//! ```text
//! W: [1, 4H, input]    R: [1, 4H, hidden]    B: [1, 8H] = [Wb | Rb]
//! ```
//!
//! The forget bias the source adds at run time is folded into `Wb`; `Rb`
//! is zero. Everything here is a pure function of the arrays.

use ndarray::{concatenate, s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, LinalgScalar};

use crate::error::{OnnxResult, TransformError};
use crate::tensor::FloatArray;

use super::weights::RnnWeights;

/// One of the four LSTM gates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Input gate
    Input,
    /// Cell candidate
    Cell,
    /// Forget gate
    Forget,
    /// Output gate
    Output,
}

impl Gate {
    /// Block order in the source kernel and bias
    pub const SOURCE_ORDER: [Gate; 4] = [Gate::Input, Gate::Cell, Gate::Forget, Gate::Output];

    /// Block order expected by the fused op
    pub const TARGET_ORDER: [Gate; 4] = [Gate::Input, Gate::Output, Gate::Forget, Gate::Cell];

    /// Index of this gate's block in the source layout
    pub fn source_index(self) -> usize {
        match self {
            Gate::Input => 0,
            Gate::Cell => 1,
            Gate::Forget => 2,
            Gate::Output => 3,
        }
    }

    /// Index of this gate's block in the fused layout
    pub fn target_index(self) -> usize {
        match self {
            Gate::Input => 0,
            Gate::Output => 1,
            Gate::Forget => 2,
            Gate::Cell => 3,
        }
    }
}

/// Parameters in the fused op's layout
#[derive(Debug, Clone, PartialEq)]
pub struct LstmParams<T> {
    /// Input weights `[1, 4H, input]`
    pub w: Array3<T>,
    /// Recurrent weights `[1, 4H, hidden]`
    pub r: Array3<T>,
    /// Input and recurrent bias `[1, 8H]`
    pub b: Array2<T>,
}

/// Relaid parameters that keep their element type
#[derive(Debug, Clone, PartialEq)]
pub struct RelaidWeights {
    /// Input weights
    pub w: FloatArray,
    /// Recurrent weights
    pub r: FloatArray,
    /// Bias
    pub b: FloatArray,
}

/// Relayout kernel, bias and forget bias for the fused op
///
/// `forget` is either a single value or one value per hidden unit.
pub fn relayout<T: LinalgScalar>(
    kernel: ArrayView2<T>,
    bias: ArrayView1<T>,
    forget: &[T],
    hidden_size: usize,
) -> OnnxResult<LstmParams<T>> {
    let gate_axis = 4 * hidden_size;
    if hidden_size == 0 || bias.len() != gate_axis || kernel.ncols() != gate_axis {
        return Err(TransformError::ShapeInferenceFailed(format!(
            "kernel {:?} and bias {:?} do not hold 4 x {} gates",
            kernel.shape(),
            bias.shape(),
            hidden_size
        )));
    }
    if kernel.nrows() <= hidden_size {
        return Err(TransformError::ShapeInferenceFailed(format!(
            "kernel {:?} has no input rows for hidden size {}",
            kernel.shape(),
            hidden_size
        )));
    }

    let forget = match forget {
        [value] => Array1::from_elem(hidden_size, *value),
        values if values.len() == hidden_size => Array1::from(values.to_vec()),
        values => {
            return Err(TransformError::ShapeInferenceFailed(format!(
                "forget bias of {} values for hidden size {}",
                values.len(),
                hidden_size
            )))
        }
    };

    let input_size = kernel.nrows() - hidden_size;
    let wx = kernel.slice(s![..input_size, ..]);
    let wh = kernel.slice(s![input_size.., ..]);

    Ok(LstmParams {
        w: relayout_kernel(wx, hidden_size)?,
        r: relayout_kernel(wh, hidden_size)?,
        b: relayout_bias(bias, forget.view(), hidden_size)?,
    })
}

/// Relayout a `[rows, 4H]` kernel block into `[1, 4H, rows]`
fn relayout_kernel<T: LinalgScalar>(
    block: ArrayView2<T>,
    hidden_size: usize,
) -> OnnxResult<Array3<T>> {
    let gates: Vec<ArrayView2<T>> = Gate::TARGET_ORDER
        .iter()
        .map(|gate| {
            let start = gate.source_index() * hidden_size;
            block.slice(s![.., start..start + hidden_size])
        })
        .collect();
    let reordered = concatenate(Axis(1), &gates)?;

    Ok(reordered
        .reversed_axes()
        .as_standard_layout()
        .into_owned()
        .insert_axis(Axis(0)))
}

/// Relayout a `[4H]` bias into `[1, 8H]`, folding in the forget bias
fn relayout_bias<T: LinalgScalar>(
    bias: ArrayView1<T>,
    forget: ArrayView1<T>,
    hidden_size: usize,
) -> OnnxResult<Array2<T>> {
    let gates: Vec<Array1<T>> = Gate::TARGET_ORDER
        .iter()
        .map(|&gate| {
            let start = gate.source_index() * hidden_size;
            let segment = bias.slice(s![start..start + hidden_size]);
            match gate {
                Gate::Forget => &segment + &forget,
                _ => segment.to_owned(),
            }
        })
        .collect();

    let recurrent = Array1::<T>::zeros(4 * hidden_size);
    let mut parts: Vec<ArrayView1<T>> = gates.iter().map(|g| g.view()).collect();
    parts.push(recurrent.view());

    Ok(concatenate(Axis(0), &parts)?.insert_axis(Axis(0)))
}

/// Relayout extracted weights, keeping their element type
pub fn relayout_weights(weights: &RnnWeights) -> OnnxResult<RelaidWeights> {
    let hidden_size = weights.hidden_size();

    let (w, r, b) = match (&weights.kernel.value, &weights.bias.value, &weights.forget_bias.value) {
        (FloatArray::F32(kernel), FloatArray::F32(bias), FloatArray::F32(forget)) => {
            let params = relayout(
                kernel.view().into_dimensionality()?,
                bias.view().into_dimensionality()?,
                &forget.iter().copied().collect::<Vec<_>>(),
                hidden_size,
            )?;
            (
                FloatArray::F32(params.w.into_dyn()),
                FloatArray::F32(params.r.into_dyn()),
                FloatArray::F32(params.b.into_dyn()),
            )
        }
        (FloatArray::F64(kernel), FloatArray::F64(bias), FloatArray::F64(forget)) => {
            let params = relayout(
                kernel.view().into_dimensionality()?,
                bias.view().into_dimensionality()?,
                &forget.iter().copied().collect::<Vec<_>>(),
                hidden_size,
            )?;
            (
                FloatArray::F64(params.w.into_dyn()),
                FloatArray::F64(params.r.into_dyn()),
                FloatArray::F64(params.b.into_dyn()),
            )
        }
        _ => {
            return Err(TransformError::Internal(
                "kernel, bias and forget bias element types differ".to_string(),
            ))
        }
    };

    Ok(RelaidWeights { w, r, b })
}
