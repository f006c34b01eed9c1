use serde::{Deserialize, Serialize};
use skein_types::constants::YARN_MIN_GROWTH;
use skein_types::primitives::Form;

/// How a heap-owned yarn buffer grows when content outgrows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Growth {
    /// At least double the capacity, for amortized appends.
    #[default]
    Double,
    /// Exactly the size needed.
    Exact,
}

impl Growth {
    /// Capacity to reallocate to when `needed` bytes exceed `capacity`.
    pub fn next_capacity(self, capacity: usize, needed: usize) -> usize {
        match self {
            Growth::Double => needed
                .max(capacity.saturating_mul(2))
                .max(YARN_MIN_GROWTH),
            Growth::Exact => needed,
        }
    }
}

/// Backing storage descriptor of a yarn.
///
/// `buf.len()` is the capacity; only the first `fill` bytes are content. A
/// caller-owned buffer was handed in by the caller and is never charged to
/// or released through the yarn's heap.
#[derive(Debug, Default)]
pub struct YarnBody {
    pub(crate) buf: Vec<u8>,
    pub(crate) fill: usize,
    pub(crate) form: Form,
    pub(crate) caller_owned: bool,
}

impl YarnBody {
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn fill(&self) -> usize {
        self.fill
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn is_caller_owned(&self) -> bool {
        self.caller_owned
    }

    pub fn content(&self) -> &[u8] {
        &self.buf[..self.fill]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_growth_rounds_up() {
        assert_eq!(Growth::Double.next_capacity(0, 1), YARN_MIN_GROWTH);
        assert_eq!(Growth::Double.next_capacity(64, 65), 128);
        assert_eq!(Growth::Double.next_capacity(64, 500), 500);
    }

    #[test]
    fn test_exact_growth() {
        assert_eq!(Growth::Exact.next_capacity(64, 65), 65);
        assert_eq!(Growth::Exact.next_capacity(0, 1), 1);
    }

    #[test]
    fn test_empty_body() {
        let body = YarnBody::default();
        assert_eq!(body.capacity(), 0);
        assert!(body.content().is_empty());
        assert!(body.form().is_plain());
        assert!(!body.is_caller_owned());
    }
}
