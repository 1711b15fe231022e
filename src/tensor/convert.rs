//! Tensor conversion utilities
//!
//! Convert between ONNX TensorProto and ndarray types.

use ndarray::{Array, ArrayD, IxDyn};

use crate::error::{OnnxResult, TransformError};
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::TensorProto;

use super::dtype::{dtype_size, i32_to_dtype};
use super::shape::numel;

/// Floating point tensor that keeps its ONNX element type.
///
/// Trained weights are relaid out in their own precision, so a `double`
/// kernel never takes a detour through `f32`.
#[derive(Debug, Clone, PartialEq)]
pub enum FloatArray {
    /// `tensor(float)`
    F32(ArrayD<f32>),
    /// `tensor(double)`
    F64(ArrayD<f64>),
}

impl FloatArray {
    /// Decode a float or double TensorProto
    pub fn from_tensor(tensor: &TensorProto) -> OnnxResult<Self> {
        match i32_to_dtype(tensor.data_type)? {
            DataType::Float => tensor_to_array_f32(tensor).map(Self::F32),
            DataType::Double => tensor_to_array_f64(tensor).map(Self::F64),
            _ => Err(TransformError::InvalidDataType(tensor.data_type)),
        }
    }

    /// Build a 0-d tensor of the given element type
    pub fn scalar(value: f64, dtype: DataType) -> OnnxResult<Self> {
        match dtype {
            DataType::Float => Ok(Self::F32(ArrayD::from_elem(IxDyn(&[]), value as f32))),
            DataType::Double => Ok(Self::F64(ArrayD::from_elem(IxDyn(&[]), value))),
            other => Err(TransformError::InvalidDataType(other as i32)),
        }
    }

    /// ONNX element type
    pub fn dtype(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::Float,
            Self::F64(_) => DataType::Double,
        }
    }

    /// Logical shape
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(a) => a.shape(),
            Self::F64(a) => a.shape(),
        }
    }

    /// Serialize back into a TensorProto
    pub fn to_tensor(&self, name: &str) -> TensorProto {
        match self {
            Self::F32(a) => array_to_tensor_f32(a, name),
            Self::F64(a) => array_to_tensor_f64(a, name),
        }
    }
}

/// Convert TensorProto to f32 ndarray
///
/// This handles both raw_data and float_data formats.
pub fn tensor_to_array_f32(tensor: &TensorProto) -> OnnxResult<ArrayD<f32>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    let expected_len = numel(&tensor.dims);

    let data: Vec<f32> = if !tensor.raw_data.is_empty() {
        match dtype {
            DataType::Float => decode_raw(&tensor.raw_data, dtype, expected_len, |b| {
                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
            })?,
            _ => return Err(TransformError::InvalidDataType(tensor.data_type)),
        }
    } else {
        match dtype {
            DataType::Float => tensor.float_data.clone(),
            _ => return Err(TransformError::InvalidDataType(tensor.data_type)),
        }
    };

    into_array(data, &tensor.dims)
}

/// Convert TensorProto to f64 ndarray
pub fn tensor_to_array_f64(tensor: &TensorProto) -> OnnxResult<ArrayD<f64>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    let expected_len = numel(&tensor.dims);

    let data: Vec<f64> = if !tensor.raw_data.is_empty() {
        match dtype {
            DataType::Double => decode_raw(&tensor.raw_data, dtype, expected_len, |b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })?,
            _ => return Err(TransformError::InvalidDataType(tensor.data_type)),
        }
    } else {
        match dtype {
            DataType::Double => tensor.double_data.clone(),
            _ => return Err(TransformError::InvalidDataType(tensor.data_type)),
        }
    };

    into_array(data, &tensor.dims)
}

/// Create TensorProto from f32 array
///
/// Elements are written in logical (row-major) order whatever the
/// array's memory layout.
pub fn array_to_tensor_f32(array: &ArrayD<f32>, name: &str) -> TensorProto {
    TensorProto {
        dims: array.shape().iter().map(|&d| d as i64).collect(),
        data_type: DataType::Float as i32,
        float_data: array.iter().copied().collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Create TensorProto from f64 array
pub fn array_to_tensor_f64(array: &ArrayD<f64>, name: &str) -> TensorProto {
    TensorProto {
        dims: array.shape().iter().map(|&d| d as i64).collect(),
        data_type: DataType::Double as i32,
        double_data: array.iter().copied().collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

fn into_array<T>(data: Vec<T>, dims: &[i64]) -> OnnxResult<ArrayD<T>> {
    let expected_len = numel(dims);
    if data.len() != expected_len {
        return Err(TransformError::ShapeInferenceFailed(format!(
            "Data length {} does not match shape {:?} (expected {})",
            data.len(),
            dims,
            expected_len
        )));
    }

    let shape: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
    Ok(Array::from_shape_vec(IxDyn(&shape), data)?)
}

fn decode_raw<T>(
    raw: &[u8],
    dtype: DataType,
    expected: usize,
    decode: impl Fn(&[u8]) -> T,
) -> OnnxResult<Vec<T>> {
    let elem_size = dtype_size(dtype)?;
    if raw.len() != expected * elem_size {
        return Err(TransformError::ShapeInferenceFailed(format!(
            "Raw data size {} does not match expected {} * {}",
            raw.len(),
            expected,
            elem_size
        )));
    }

    Ok(raw.chunks_exact(elem_size).map(decode).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_to_array_f32_float_data() {
        let tensor = TensorProto {
            dims: vec![2, 3],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            ..Default::default()
        };

        let array = tensor_to_array_f32(&tensor).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[0, 0]], 1.0);
        assert_eq!(array[[1, 2]], 6.0);
    }

    #[test]
    fn test_tensor_to_array_f32_raw_data() {
        let raw: Vec<u8> = [1.0f32, 2.0f32]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();

        let tensor = TensorProto {
            dims: vec![2],
            data_type: DataType::Float as i32,
            raw_data: raw,
            ..Default::default()
        };

        let array = tensor_to_array_f32(&tensor).unwrap();
        assert_eq!(array.shape(), &[2]);
        assert_eq!(array[0], 1.0);
        assert_eq!(array[1], 2.0);
    }

    #[test]
    fn test_tensor_to_array_f64_raw_data() {
        let raw: Vec<u8> = [0.1f64, -7.25f64]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();

        let tensor = TensorProto {
            dims: vec![2],
            data_type: DataType::Double as i32,
            raw_data: raw,
            ..Default::default()
        };

        let array = tensor_to_array_f64(&tensor).unwrap();
        assert_eq!(array[0], 0.1);
        assert_eq!(array[1], -7.25);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let tensor = TensorProto {
            dims: vec![2, 2],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, 2.0, 3.0],
            ..Default::default()
        };

        assert!(tensor_to_array_f32(&tensor).is_err());
    }

    #[test]
    fn test_array_to_tensor_f32() {
        let array = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let tensor = array_to_tensor_f32(&array, "test");

        assert_eq!(tensor.dims, vec![2, 2]);
        assert_eq!(tensor.float_data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tensor.name, "test");
    }

    #[test]
    fn test_transposed_array_serializes_logically() {
        let array = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .reversed_axes();
        let tensor = array_to_tensor_f32(&array, "t");

        assert_eq!(tensor.dims, vec![3, 2]);
        assert_eq!(tensor.float_data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_float_array_keeps_dtype() {
        let tensor = TensorProto {
            dims: vec![1],
            data_type: DataType::Double as i32,
            double_data: vec![0.5],
            ..Default::default()
        };

        let value = FloatArray::from_tensor(&tensor).unwrap();
        assert_eq!(value.dtype(), DataType::Double);
        assert_eq!(value.to_tensor("x").double_data, vec![0.5]);
    }

    #[test]
    fn test_float_array_rejects_integers() {
        let tensor = TensorProto {
            dims: vec![1],
            data_type: DataType::Int64 as i32,
            int64_data: vec![3],
            ..Default::default()
        };

        assert!(FloatArray::from_tensor(&tensor).is_err());
    }
}
