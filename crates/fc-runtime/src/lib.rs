#![forbid(unsafe_code)]

//! Collaborators every frankencolumn operator is handed explicitly: where
//! output buffers come from ([`MemoryResource`]) and how row-independent
//! work is scheduled ([`Executor`]).

use thiserror::Error;

pub mod config;
pub mod executor;
pub mod memory;

pub use config::{ExecutorKind, RuntimeConfig};
pub use executor::{DEFAULT_PARALLEL_MIN_ROWS, ExecutionContext, Executor};
pub use memory::{AllocationError, BoundedResource, DeviceBuffer, MemoryResource, SystemResource};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
    #[error("segment bounds do not partition a buffer of {buffer_len} bytes")]
    SegmentBounds { buffer_len: usize },
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}
