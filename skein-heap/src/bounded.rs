use std::sync::Arc;

use skein_types::error::{SkeinError, SkeinResult};
use tracing::debug;

use crate::counters::Counters;
use crate::traits::{Heap, HeapStats, SharedHeap};

/// Heap that refuses grants past a fixed byte budget.
///
/// Used to cap a store's memory and to exercise out-of-memory paths.
#[derive(Debug)]
pub struct BoundedHeap {
    limit: usize,
    counters: Counters,
}

impl BoundedHeap {
    /// Create a heap that grants at most `limit` bytes at a time.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counters: Counters::default(),
        }
    }

    /// Create a bounded heap already wrapped for sharing between nodes.
    pub fn shared(limit: usize) -> SharedHeap {
        Arc::new(Self::new(limit))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes still available under the limit.
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.counters.in_use())
    }
}

impl Heap for BoundedHeap {
    fn grant(&self, bytes: usize) -> SkeinResult<()> {
        self.counters.try_grant(bytes, self.limit).map_err(|available| {
            debug!(requested = bytes, available, limit = self.limit, "heap grant refused");
            SkeinError::OutOfMemory {
                requested: bytes,
                available,
            }
        })
    }

    fn release(&self, bytes: usize) {
        self.counters.release(bytes);
    }

    fn stats(&self) -> HeapStats {
        self.counters.snapshot()
    }
}
