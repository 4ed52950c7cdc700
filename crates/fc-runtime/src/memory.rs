use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("allocation of {requested} bytes exceeds limit {limit} ({in_use} bytes in use)")]
    LimitExceeded {
        requested: usize,
        in_use: usize,
        limit: usize,
    },
    #[error("host allocator could not provide {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// Source of output buffers for operators.
///
/// Implementations must be safe to call from concurrently running operators.
pub trait MemoryResource: Send + Sync + fmt::Debug {
    /// Allocate a zero-initialised buffer of exactly `bytes` bytes.
    fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, AllocationError>;

    /// Bytes currently held by live buffers issued by this resource.
    fn bytes_in_use(&self) -> usize;
}

/// Owned, fixed-size byte buffer issued by a [`MemoryResource`].
///
/// Dropping the buffer returns its size to the issuing resource.
pub struct DeviceBuffer {
    bytes: Vec<u8>,
    usage: Option<Arc<AtomicUsize>>,
}

impl DeviceBuffer {
    /// Wrap host bytes that are not accounted against any resource.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes, usage: None }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.usage.is_some()
    }
}

impl Deref for DeviceBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for DeviceBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Some(usage) = &self.usage {
            usage.fetch_sub(self.bytes.len(), Ordering::AcqRel);
        }
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.bytes.len())
            .field("tracked", &self.usage.is_some())
            .finish()
    }
}

fn zeroed(bytes: usize) -> Result<Vec<u8>, AllocationError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| AllocationError::OutOfMemory { requested: bytes })?;
    buf.resize(bytes, 0);
    Ok(buf)
}

/// Unbounded host-memory resource.
#[derive(Debug, Default)]
pub struct SystemResource {
    usage: Arc<AtomicUsize>,
}

impl SystemResource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryResource for SystemResource {
    fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, AllocationError> {
        let buf = zeroed(bytes).inspect_err(|err| warn!(%err, "system allocation failed"))?;
        self.usage.fetch_add(bytes, Ordering::AcqRel);
        trace!(bytes, "system allocation");
        Ok(DeviceBuffer {
            bytes: buf,
            usage: Some(Arc::clone(&self.usage)),
        })
    }

    fn bytes_in_use(&self) -> usize {
        self.usage.load(Ordering::Acquire)
    }
}

/// Resource that refuses requests once live allocations would pass `limit`.
#[derive(Debug)]
pub struct BoundedResource {
    limit: usize,
    usage: Arc<AtomicUsize>,
}

impl BoundedResource {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            usage: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn reserve(&self, bytes: usize) -> Result<(), AllocationError> {
        self.usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_use| {
                in_use
                    .checked_add(bytes)
                    .filter(|total| *total <= self.limit)
            })
            .map(|_| ())
            .map_err(|in_use| AllocationError::LimitExceeded {
                requested: bytes,
                in_use,
                limit: self.limit,
            })
    }
}

impl MemoryResource for BoundedResource {
    fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, AllocationError> {
        if let Err(err) = self.reserve(bytes) {
            warn!(%err, "bounded allocation refused");
            return Err(err);
        }
        let buf = match zeroed(bytes) {
            Ok(buf) => buf,
            Err(err) => {
                self.usage.fetch_sub(bytes, Ordering::AcqRel);
                warn!(%err, "bounded allocation failed");
                return Err(err);
            }
        };
        trace!(bytes, limit = self.limit, "bounded allocation");
        Ok(DeviceBuffer {
            bytes: buf,
            usage: Some(Arc::clone(&self.usage)),
        })
    }

    fn bytes_in_use(&self) -> usize {
        self.usage.load(Ordering::Acquire)
    }
}
