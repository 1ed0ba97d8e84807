//! Buffer pool module for Ssrelay
//!
//! Datagram buffers are recycled through a shared free list so that the
//! steady-state relay path does not allocate per packet.

mod guard;

pub use guard::PooledBuffer;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Size of every pooled datagram buffer
pub const UDP_BUF_SIZE: usize = 64 * 1024;

/// Shared pool of fixed-size datagram buffers
///
/// Cloning the pool is cheap; all clones share one free list. The free
/// list is unbounded: it grows to the peak number of datagrams in flight.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: Mutex<Vec<Box<[u8]>>>,
    buf_size: usize,
}

impl BufferPool {
    /// Create a pool of [`UDP_BUF_SIZE`] buffers
    pub fn new() -> Self {
        Self::with_buffer_size(UDP_BUF_SIZE)
    }

    /// Create a pool with a custom buffer size
    pub fn with_buffer_size(buf_size: usize) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                buf_size,
            }),
        }
    }

    /// Take a buffer from the pool, allocating when none is idle.
    ///
    /// Contents are whatever the previous user left behind.
    pub fn acquire(&self) -> PooledBuffer {
        let storage = self
            .free()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.buf_size].into_boxed_slice());
        PooledBuffer::new(storage, self.clone())
    }

    /// Hand a buffer back for reuse
    pub fn release(&self, buf: PooledBuffer) {
        drop(buf);
    }

    /// Number of buffers currently idle in the pool
    pub fn idle(&self) -> usize {
        self.free().len()
    }

    pub(crate) fn put(&self, storage: Box<[u8]>) {
        if storage.len() == self.inner.buf_size {
            self.free().push(storage);
        }
    }

    fn free(&self) -> MutexGuard<'_, Vec<Box<[u8]>>> {
        // The list stays consistent even if a holder panicked
        self.inner
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buf_size", &self.inner.buf_size)
            .field("idle", &self.idle())
            .finish()
    }
}
