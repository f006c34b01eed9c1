//! Heaps for the skein node runtime.
//!
//! Provides the [`Heap`](traits::Heap) trait every node is bound to, with an
//! unbounded [`SystemHeap`](system::SystemHeap) and a budgeted
//! [`BoundedHeap`](bounded::BoundedHeap).

pub mod bounded;
mod counters;
pub mod system;
pub mod traits;

pub use bounded::BoundedHeap;
pub use system::SystemHeap;
pub use traits::{same_heap, Heap, HeapStats, SharedHeap};
