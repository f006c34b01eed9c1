use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::traits::HeapStats;

/// Atomic accounting shared by the heap implementations.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    in_use: AtomicUsize,
    peak: AtomicUsize,
    allocs: AtomicU64,
    frees: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    /// Add `bytes` to `in_use` if the result stays within `limit`.
    /// Returns the bytes that were available on refusal.
    pub(crate) fn try_grant(&self, bytes: usize, limit: usize) -> Result<(), usize> {
        let granted = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            });
        match granted {
            Ok(previous) => {
                self.peak.fetch_max(previous + bytes, Ordering::AcqRel);
                self.allocs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(used) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(limit.saturating_sub(used))
            }
        }
    }

    pub(crate) fn release(&self, bytes: usize) {
        let previous = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            })
            .unwrap_or(0);
        assert!(
            previous >= bytes,
            "heap release of {bytes} bytes exceeds {previous} in use"
        );
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> HeapStats {
        HeapStats {
            in_use: self.in_use.load(Ordering::Acquire),
            peak: self.peak.load(Ordering::Acquire),
            allocs: self.allocs.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
