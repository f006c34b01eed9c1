use std::fmt;
use std::sync::Arc;

use skein_types::error::{SkeinError, SkeinResult};

/// Snapshot of a heap's accounting counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes currently granted and not yet released.
    pub in_use: usize,
    /// High-water mark of `in_use`.
    pub peak: usize,
    /// Number of successful grants.
    pub allocs: u64,
    /// Number of releases.
    pub frees: u64,
    /// Number of refused grants.
    pub failures: u64,
}

/// Allocator bound to a node at construction.
///
/// Every growth, shrink, and free of a node's storage goes through the heap
/// it was created with. A heap only accounts for bytes; the backing memory is
/// a `Vec<u8>` obtained with a fallible reservation, so an allocator refusal
/// also surfaces as [`SkeinError::OutOfMemory`].
pub trait Heap: Send + Sync + fmt::Debug {
    /// Account for `bytes` more storage, or refuse.
    fn grant(&self, bytes: usize) -> SkeinResult<()>;

    /// Give back `bytes` previously granted.
    fn release(&self, bytes: usize);

    /// Current counters.
    fn stats(&self) -> HeapStats;

    /// Allocate a zeroed block of exactly `size` bytes.
    fn alloc_block(&self, size: usize) -> SkeinResult<Vec<u8>> {
        self.grant(size)?;
        let mut block = Vec::new();
        if block.try_reserve_exact(size).is_err() {
            self.release(size);
            return Err(SkeinError::OutOfMemory {
                requested: size,
                available: 0,
            });
        }
        block.resize(size, 0);
        Ok(block)
    }

    /// Free a block obtained from [`Heap::alloc_block`] on this heap.
    fn free_block(&self, block: Vec<u8>) {
        self.release(block.len());
    }
}

/// Heap handle shared by every node allocated from it.
pub type SharedHeap = Arc<dyn Heap>;

/// Blanket implementation so an `Arc`-wrapped heap can be passed wherever a
/// heap is expected.
impl<H: Heap + ?Sized> Heap for Arc<H> {
    fn grant(&self, bytes: usize) -> SkeinResult<()> {
        (**self).grant(bytes)
    }

    fn release(&self, bytes: usize) {
        (**self).release(bytes)
    }

    fn stats(&self) -> HeapStats {
        (**self).stats()
    }
}

/// Whether two shared heaps are the same allocator.
pub fn same_heap(a: &SharedHeap, b: &SharedHeap) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
