//! Op kinds the recurrence matchers care about
//!
//! Imported graphs carry both framework and ONNX spellings of the same
//! operation, so each kind is a small set.

/// Wildcard op spec: matches any op, or no producer at all
pub const WILDCARD: &str = "*";

/// Separator for alternative op kinds inside an op spec (`"Add|AddV2"`)
pub const ALTERNATIVE_SEP: char = '|';

/// Concatenation kinds
pub const CONCAT_OPS: &[&str] = &["ConcatV2", "ConcatV3", "Concat"];

/// Slice kinds
pub const SLICE_OPS: &[&str] = &["Slice"];

/// Element selection kinds
pub const SELECT_OPS: &[&str] = &["Select", "SelectV2"];

/// Per-step tensor array writes (scan output accumulation)
pub const TENSOR_ARRAY_WRITE_OPS: &[&str] = &["TensorArrayWriteV3"];

/// Binary kinds whose two inputs may be matched in either order
pub const COMMUTATIVE_OPS: &[&str] = &["Add", "AddV2", "Mul"];

/// Loop-entry kinds: values crossing into a loop body
pub const ENTER_OPS: &[&str] = &["Enter"];

/// Check if an op type is a concatenation
pub fn is_concat_op(op_type: &str) -> bool {
    CONCAT_OPS.contains(&op_type)
}

/// Check if an op type is a slice
pub fn is_slice_op(op_type: &str) -> bool {
    SLICE_OPS.contains(&op_type)
}

/// Check if an op type is a select
pub fn is_select_op(op_type: &str) -> bool {
    SELECT_OPS.contains(&op_type)
}

/// Check if an op type writes into a tensor array
pub fn is_tensor_array_write_op(op_type: &str) -> bool {
    TENSOR_ARRAY_WRITE_OPS.contains(&op_type)
}

/// Check if a binary op's inputs commute
pub fn is_commutative(op_type: &str) -> bool {
    COMMUTATIVE_OPS.contains(&op_type)
}

/// Check if an op type brings a value into a loop body
pub fn is_enter_op(op_type: &str) -> bool {
    ENTER_OPS.contains(&op_type)
}

/// Check if `op_type` satisfies an op spec such as `"Add|AddV2"` or `"*"`
pub fn op_spec_accepts(spec: &str, op_type: &str) -> bool {
    spec == WILDCARD || spec.split(ALTERNATIVE_SEP).any(|alt| alt == op_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kinds() {
        assert!(is_concat_op("ConcatV2"));
        assert!(is_concat_op("Concat"));
        assert!(!is_concat_op("Split"));
        assert!(is_slice_op("Slice"));
        assert!(is_select_op("SelectV2"));
        assert!(is_tensor_array_write_op("TensorArrayWriteV3"));
        assert!(is_enter_op("Enter"));
    }

    #[test]
    fn test_commutative() {
        assert!(is_commutative("Mul"));
        assert!(is_commutative("AddV2"));
        assert!(!is_commutative("MatMul"));
        assert!(!is_commutative("BiasAdd"));
    }

    #[test]
    fn test_op_spec_accepts() {
        assert!(op_spec_accepts("Add|AddV2", "AddV2"));
        assert!(op_spec_accepts("Add|AddV2", "Add"));
        assert!(!op_spec_accepts("Add|AddV2", "Sub"));
        assert!(op_spec_accepts("*", "LSTMBlockCell"));
        assert!(!op_spec_accepts("Add", "AddV2"));
    }
}
