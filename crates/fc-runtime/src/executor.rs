use std::sync::Arc;

use rayon::prelude::*;

use crate::RuntimeError;
use crate::config::{ExecutorKind, RuntimeConfig};
use crate::memory::{AllocationError, BoundedResource, DeviceBuffer, MemoryResource, SystemResource};

pub const DEFAULT_PARALLEL_MIN_ROWS: usize = 65_536;

/// Rows handed to one rayon task; keeps per-task overhead small.
const PARALLEL_CHUNK_ROWS: usize = 4_096;

/// How row-independent work is scheduled.
///
/// Both variants produce identical results; `Parallel` only fans out once a
/// call touches at least `min_rows` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Sequential,
    Parallel { min_rows: usize },
}

impl Executor {
    #[must_use]
    pub fn parallel() -> Self {
        Self::Parallel {
            min_rows: DEFAULT_PARALLEL_MIN_ROWS,
        }
    }

    #[must_use]
    pub fn runs_parallel(self, rows: usize) -> bool {
        match self {
            Self::Sequential => false,
            Self::Parallel { min_rows } => rows >= min_rows.max(1),
        }
    }

    /// Hand each `width`-byte row of `out` to `f` along with its row index.
    pub fn for_each_row_mut<F>(self, out: &mut [u8], width: usize, f: F)
    where
        F: Fn(usize, &mut [u8]) + Send + Sync,
    {
        if width == 0 {
            return;
        }
        let rows = out.len() / width;
        if self.runs_parallel(rows) {
            out.par_chunks_exact_mut(width)
                .with_min_len(PARALLEL_CHUNK_ROWS)
                .enumerate()
                .for_each(|(row, slot)| f(row, slot));
        } else {
            out.chunks_exact_mut(width)
                .enumerate()
                .for_each(|(row, slot)| f(row, slot));
        }
    }

    /// Evaluate `f` for every row index, collecting results in row order.
    #[must_use]
    pub fn map_rows<T, F>(self, rows: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        if self.runs_parallel(rows) {
            (0..rows)
                .into_par_iter()
                .with_min_len(PARALLEL_CHUNK_ROWS)
                .map(f)
                .collect()
        } else {
            (0..rows).map(f).collect()
        }
    }

    /// Split `out` at `bounds` and hand every segment to `f`.
    ///
    /// `bounds` must start at 0, be non-decreasing, and end at `out.len()`.
    pub fn for_each_segment_mut<F>(
        self,
        out: &mut [u8],
        bounds: &[usize],
        f: F,
    ) -> Result<(), RuntimeError>
    where
        F: Fn(usize, &mut [u8]) + Send + Sync,
    {
        let well_formed = bounds.first().is_none_or(|first| *first == 0)
            && bounds.last().copied().unwrap_or(0) == out.len()
            && bounds.windows(2).all(|pair| pair[0] <= pair[1]);
        if !well_formed {
            return Err(RuntimeError::SegmentBounds {
                buffer_len: out.len(),
            });
        }

        let mut segments = Vec::with_capacity(bounds.len().saturating_sub(1));
        let mut rest = out;
        for pair in bounds.windows(2) {
            let (head, tail) = rest.split_at_mut(pair[1] - pair[0]);
            segments.push(head);
            rest = tail;
        }

        if self.runs_parallel(segments.len()) {
            segments
                .into_par_iter()
                .with_min_len(PARALLEL_CHUNK_ROWS)
                .enumerate()
                .for_each(|(row, segment)| f(row, segment));
        } else {
            segments
                .into_iter()
                .enumerate()
                .for_each(|(row, segment)| f(row, segment));
        }
        Ok(())
    }

    /// Exclusive prefix sum: `lengths.len() + 1` entries, first entry 0.
    ///
    /// The parallel form is a two-pass chunked scan and yields the same
    /// sequence as the sequential one.
    #[must_use]
    pub fn exclusive_scan(self, lengths: &[usize]) -> Vec<usize> {
        let mut out = vec![0_usize; lengths.len() + 1];
        if !self.runs_parallel(lengths.len()) {
            let mut running = 0_usize;
            for (slot, len) in out[1..].iter_mut().zip(lengths) {
                running += len;
                *slot = running;
            }
            return out;
        }

        let chunk_sums: Vec<usize> = lengths
            .par_chunks(PARALLEL_CHUNK_ROWS)
            .map(|chunk| chunk.iter().sum())
            .collect();
        let mut chunk_starts = Vec::with_capacity(chunk_sums.len());
        let mut running = 0_usize;
        for sum in &chunk_sums {
            chunk_starts.push(running);
            running += sum;
        }

        out[1..]
            .par_chunks_mut(PARALLEL_CHUNK_ROWS)
            .zip(lengths.par_chunks(PARALLEL_CHUNK_ROWS))
            .zip(chunk_starts.par_iter())
            .for_each(|((slots, lens), start)| {
                let mut running = *start;
                for (slot, len) in slots.iter_mut().zip(lens) {
                    running += len;
                    *slot = running;
                }
            });
        out
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::parallel()
    }
}

/// Compute substrate and memory resource threaded into every operator call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    executor: Executor,
    resource: Arc<dyn MemoryResource>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(executor: Executor, resource: Arc<dyn MemoryResource>) -> Self {
        Self { executor, resource }
    }

    /// Single-threaded executor over the system resource.
    #[must_use]
    pub fn sequential() -> Self {
        Self::new(Executor::Sequential, Arc::new(SystemResource::new()))
    }

    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let executor = match config.executor {
            ExecutorKind::Sequential => Executor::Sequential,
            ExecutorKind::Parallel => Executor::Parallel {
                min_rows: config.parallel_min_rows,
            },
        };
        let resource: Arc<dyn MemoryResource> = match config.memory_limit_bytes {
            Some(limit) => Arc::new(BoundedResource::new(limit)),
            None => Arc::new(SystemResource::new()),
        };
        Self::new(executor, resource)
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: Arc<dyn MemoryResource>) -> Self {
        self.resource = resource;
        self
    }

    #[must_use]
    pub fn executor(&self) -> Executor {
        self.executor
    }

    #[must_use]
    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }

    pub fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, AllocationError> {
        self.resource.allocate(bytes)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Executor::default(), Arc::new(SystemResource::new()))
    }
}
