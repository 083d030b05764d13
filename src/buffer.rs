//! Platform buffer collaborator.
//!
//! On the target, the joinable-network cache lives in a buffer borrowed from
//! the stack's packet-buffer pool, grown and shrunk as networks are cached and
//! handed out. The engine never allocates; it asks a [`BufferProvider`] for a
//! handle when a joinable search starts and gives it back at cleanup.
//!
//! [`StaticBufferPool`] is the host implementation: one fixed buffer with
//! acquisition bookkeeping, enough for the simulator and unit tests.

use crate::joinable::{MAX_JOINABLE_NETWORKS, NETWORK_RECORD_BYTES};
use std::fmt;

/// Opaque handle to a platform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u16);

impl BufferHandle {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u16 {
        self.0
    }
}

/// Errors from buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The handle is not currently acquired.
    UnknownHandle(BufferHandle),
    /// The requested size does not fit the buffer.
    TooLarge {
        /// Entries requested.
        entries: usize,
        /// Entries the buffer can hold.
        max: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandle(handle) => write!(f, "unknown buffer handle {}", handle.0),
            Self::TooLarge { entries, max } => {
                write!(f, "{} entries exceed buffer capacity {}", entries, max)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Memory provider for the joinable-network cache.
pub trait BufferProvider {
    /// Reserve a buffer of up to `max_bytes`.
    ///
    /// Returns `None` when the platform is out of buffers.
    fn acquire(&mut self, max_bytes: usize) -> Option<BufferHandle>;

    /// Resize the buffer to hold `entries` network records.
    fn resize(&mut self, handle: BufferHandle, entries: usize) -> Result<(), BufferError>;

    /// Give the buffer back.
    fn release(&mut self, handle: BufferHandle);
}

impl<T: BufferProvider + ?Sized> BufferProvider for &mut T {
    fn acquire(&mut self, max_bytes: usize) -> Option<BufferHandle> {
        (**self).acquire(max_bytes)
    }

    fn resize(&mut self, handle: BufferHandle, entries: usize) -> Result<(), BufferError> {
        (**self).resize(handle, entries)
    }

    fn release(&mut self, handle: BufferHandle) {
        (**self).release(handle)
    }
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    handle: BufferHandle,
    max_entries: usize,
    entries: usize,
}

/// Single fixed-size buffer with acquisition bookkeeping.
#[derive(Debug, Clone)]
pub struct StaticBufferPool {
    total_bytes: usize,
    lease: Option<Lease>,
    next_id: u16,
    acquisitions: u32,
    releases: u32,
    exhausted: bool,
}

impl StaticBufferPool {
    /// Pool backing one buffer of `total_bytes`.
    pub fn new(total_bytes: usize) -> Self {
        Self {
            total_bytes,
            lease: None,
            next_id: 1,
            acquisitions: 0,
            releases: 0,
            exhausted: false,
        }
    }

    /// Pool that refuses every request.
    pub fn exhausted() -> Self {
        let mut pool = Self::new(0);
        pool.exhausted = true;
        pool
    }

    /// True while a buffer is handed out.
    pub fn in_use(&self) -> bool {
        self.lease.is_some()
    }

    /// Records the current buffer is sized for.
    pub fn entries(&self) -> usize {
        self.lease.map_or(0, |lease| lease.entries)
    }

    pub fn acquisitions(&self) -> u32 {
        self.acquisitions
    }

    pub fn releases(&self) -> u32 {
        self.releases
    }
}

impl Default for StaticBufferPool {
    fn default() -> Self {
        Self::new(MAX_JOINABLE_NETWORKS * NETWORK_RECORD_BYTES)
    }
}

impl BufferProvider for StaticBufferPool {
    fn acquire(&mut self, max_bytes: usize) -> Option<BufferHandle> {
        if self.exhausted || self.lease.is_some() || max_bytes > self.total_bytes {
            return None;
        }
        let handle = BufferHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.lease = Some(Lease {
            handle,
            max_entries: (max_bytes / NETWORK_RECORD_BYTES).min(MAX_JOINABLE_NETWORKS),
            entries: 0,
        });
        self.acquisitions += 1;
        Some(handle)
    }

    fn resize(&mut self, handle: BufferHandle, entries: usize) -> Result<(), BufferError> {
        let lease = match self.lease.as_mut() {
            Some(lease) if lease.handle == handle => lease,
            _ => return Err(BufferError::UnknownHandle(handle)),
        };
        if entries > lease.max_entries {
            return Err(BufferError::TooLarge {
                entries,
                max: lease.max_entries,
            });
        }
        lease.entries = entries;
        Ok(())
    }

    fn release(&mut self, handle: BufferHandle) {
        if matches!(self.lease, Some(lease) if lease.handle == handle) {
            self.lease = None;
            self.releases += 1;
        } else {
            log::warn!("release of unknown buffer handle {}", handle.0);
        }
    }
}
