//! RAII guard for pooled buffers
//!
//! Provides automatic return of buffers to the pool when dropped.

use super::BufferPool;
use std::ops::{Deref, DerefMut};

/// A datagram buffer borrowed from a [`BufferPool`]
///
/// Derefs to the whole storage so it can be read into; [`filled`] is the
/// part holding the current datagram. Dropping the guard returns the
/// storage to the pool exactly once.
///
/// [`filled`]: PooledBuffer::filled
pub struct PooledBuffer {
    storage: Box<[u8]>,
    len: usize,
    pool: BufferPool,
}

impl PooledBuffer {
    pub(super) fn new(storage: Box<[u8]>, pool: BufferPool) -> Self {
        PooledBuffer {
            storage,
            len: 0,
            pool,
        }
    }

    /// Total size of the storage
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Length of the datagram currently held
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no datagram bytes are held
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark the first `len` bytes as the datagram.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.storage.len(), "datagram exceeds buffer");
        self.len = len;
    }

    /// The datagram bytes
    pub fn filled(&self) -> &[u8] {
        &self.storage[..self.len]
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.storage
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        self.pool.put(storage);
    }
}
