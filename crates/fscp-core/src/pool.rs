//! Fixed-capacity datagram buffer pool with a heap fallback.
//!
//! The receive loop churns through one buffer per datagram; the pool bounds
//! that allocation. When every pooled buffer is in flight the pool falls back
//! to the heap and logs one rate-limited warning instead of blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Log a fallback warning at most once per this many misses
const MISS_WARN_INTERVAL: u64 = 1024;

/// Pool statistics snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Buffers handed out from the pool
    pub hits: u64,
    /// Heap-allocated fallbacks
    pub misses: u64,
}

/// A bounded pool of fixed-size byte buffers
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    max_buffers: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BufferPool {
    /// Create a pool of `max_buffers` buffers of `buffer_size` bytes each.
    ///
    /// All buffers are allocated up front.
    #[must_use]
    pub fn new(buffer_size: usize, max_buffers: usize) -> Self {
        let free = (0..max_buffers).map(|_| vec![0u8; buffer_size]).collect();

        Self {
            free: Mutex::new(free),
            buffer_size,
            max_buffers,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a zeroed-capacity buffer of the pool's size.
    ///
    /// Falls back to a fresh heap allocation when the pool is drained.
    pub fn get(&self) -> Vec<u8> {
        let pooled = self
            .free
            .lock()
            .map(|mut free| free.pop())
            .unwrap_or(None);

        match pooled {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                let misses = self.misses.fetch_add(1, Ordering::Relaxed);
                if misses % MISS_WARN_INTERVAL == 0 {
                    tracing::warn!(
                        misses = misses + 1,
                        "datagram buffer pool exhausted, falling back to heap"
                    );
                }
                vec![0u8; self.buffer_size]
            }
        }
    }

    /// Return a buffer to the pool.
    ///
    /// Wrong-sized or surplus buffers are dropped.
    pub fn put(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() < self.buffer_size {
            return;
        }
        buffer.resize(self.buffer_size, 0);

        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_buffers {
                free.push(buffer);
            }
        }
    }

    /// The size of each pooled buffer
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Hit/miss counters
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_cycle() {
        let pool = BufferPool::new(1500, 4);

        let buf = pool.get();
        assert_eq!(buf.len(), 1500);
        pool.put(buf);

        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 0);
    }

    #[test]
    fn test_heap_fallback_when_drained() {
        let pool = BufferPool::new(64, 2);

        let a = pool.get();
        let b = pool.get();
        let c = pool.get(); // heap fallback, never blocks

        assert_eq!(c.len(), 64);
        assert_eq!(pool.stats().misses, 1);

        drop((a, b, c));
    }

    #[test]
    fn test_surplus_buffers_dropped() {
        let pool = BufferPool::new(64, 1);

        pool.put(vec![0u8; 64]);
        pool.put(vec![0u8; 64]);

        // Only one pooled slot; the rest went to the allocator.
        let _ = pool.get();
        let _ = pool.get();
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn test_undersized_return_dropped() {
        let pool = BufferPool::new(1500, 1);
        let _ = pool.get();
        pool.put(Vec::with_capacity(8));

        let _ = pool.get();
        assert_eq!(pool.stats().misses, 1);
    }
}
