#![forbid(unsafe_code)]

//! Copying transforms over column views. [`shift`] displaces rows by a signed
//! offset and fills the vacated rows from a scalar.

use fc_columnar::ColumnError;
use fc_runtime::{AllocationError, RuntimeError};
use fc_types::DType;
use thiserror::Error;

mod dispatch;
mod shift;

pub use dispatch::{PathTag, dispatch};
pub use shift::{shift, shift_columns, shift_with};

/// Failures of a copying transform. No output is produced when one is
/// returned, and every buffer allocated for the call has been released.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CopyError {
    #[error("fill scalar of dtype {fill} does not match column dtype {column}")]
    TypeMismatch { column: DType, fill: DType },
    #[error("{columns} columns were given {fills} fill scalars")]
    FillCountMismatch { columns: usize, fills: usize },
    #[error(transparent)]
    Allocation(AllocationError),
    #[error(transparent)]
    Column(ColumnError),
    #[error(transparent)]
    Runtime(RuntimeError),
}

impl From<AllocationError> for CopyError {
    fn from(err: AllocationError) -> Self {
        Self::Allocation(err)
    }
}

// Allocator failures surface as `Allocation` whichever layer hit them.
impl From<ColumnError> for CopyError {
    fn from(err: ColumnError) -> Self {
        match err {
            ColumnError::Allocation(inner) => Self::Allocation(inner),
            other => Self::Column(other),
        }
    }
}

impl From<RuntimeError> for CopyError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Allocation(inner) => Self::Allocation(inner),
            other => Self::Runtime(other),
        }
    }
}
