#![forbid(unsafe_code)]

//! Columnar storage: packed validity masks, owned columns, and zero-copy
//! views that share buffers with the column they were sliced from.

use fc_runtime::AllocationError;
use fc_types::{DType, TypeError};
use thiserror::Error;

mod column;
mod validity;

pub use column::{Column, ColumnData, ColumnView, OFFSET_WIDTH, encode_offsets, slice};
pub use validity::ValidityMask;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("slice [{start}, {end}) is out of bounds for a column of {len} rows")]
    SliceOutOfBounds { start: usize, end: usize, len: usize },
    #[error("row {row} is out of bounds for a column of {len} rows")]
    RowOutOfBounds { row: usize, len: usize },
    #[error("buffers do not match the storage layout of dtype {dtype}")]
    StorageMismatch { dtype: DType },
    #[error("scalar of dtype {actual} cannot be stored in a {expected} column")]
    ScalarTypeMismatch { expected: DType, actual: DType },
    #[error("string data of {bytes} bytes exceeds the offset range")]
    SizeOverflow { bytes: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}
