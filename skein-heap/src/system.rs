use std::sync::Arc;

use skein_types::error::{SkeinError, SkeinResult};

use crate::counters::Counters;
use crate::traits::{Heap, HeapStats, SharedHeap};

/// Unbounded heap backed by the global allocator.
///
/// Grants only fail when the byte counter itself would overflow.
#[derive(Debug, Default)]
pub struct SystemHeap {
    counters: Counters,
}

impl SystemHeap {
    /// Create a new system heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a system heap already wrapped for sharing between nodes.
    pub fn shared() -> SharedHeap {
        Arc::new(Self::new())
    }

    /// Bytes currently granted.
    pub fn in_use(&self) -> usize {
        self.counters.in_use()
    }
}

impl Heap for SystemHeap {
    fn grant(&self, bytes: usize) -> SkeinResult<()> {
        self.counters
            .try_grant(bytes, usize::MAX)
            .map_err(|available| SkeinError::OutOfMemory {
                requested: bytes,
                available,
            })
    }

    fn release(&self, bytes: usize) {
        self.counters.release(bytes);
    }

    fn stats(&self) -> HeapStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_release() {
        let heap = SystemHeap::new();
        heap.grant(100).unwrap();
        heap.grant(50).unwrap();
        assert_eq!(heap.in_use(), 150);

        heap.release(100);
        let stats = heap.stats();
        assert_eq!(stats.in_use, 50);
        assert_eq!(stats.peak, 150);
        assert_eq!(stats.allocs, 2);
        assert_eq!(stats.frees, 1);
    }

    #[test]
    fn test_alloc_block_is_zeroed() {
        let heap = SystemHeap::new();
        let block = heap.alloc_block(32).unwrap();
        assert_eq!(block.len(), 32);
        assert!(block.iter().all(|b| *b == 0));
        assert_eq!(heap.in_use(), 32);

        heap.free_block(block);
        assert_eq!(heap.in_use(), 0);
    }

    #[test]
    fn test_shared_heap_through_arc() {
        let heap = SystemHeap::shared();
        let block = heap.alloc_block(8).unwrap();
        assert_eq!(heap.stats().in_use, 8);
        heap.free_block(block);
        assert_eq!(heap.stats().in_use, 0);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_over_release_panics() {
        let heap = SystemHeap::new();
        heap.grant(10).unwrap();
        heap.release(11);
    }
}
