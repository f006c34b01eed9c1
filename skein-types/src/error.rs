use thiserror::Error;

use crate::primitives::Token;
use crate::tags::{Access, Derived};

/// Recoverable errors raised by the node runtime.
///
/// Programmer errors (refcount underflow, dropping an unclosed node) are not
/// represented here; they panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkeinError {
    // ─── Allocation ──────────────────────────────────────────────────────────
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    // ─── Lifecycle ───────────────────────────────────────────────────────────
    #[error("cannot {operation} a {access} node")]
    InvalidState {
        access: Access,
        operation: &'static str,
    },

    #[error("cannot {operation}: node is frozen")]
    Frozen { operation: &'static str },

    #[error("stale node handle: slot {index} generation {generation}")]
    StaleNode { index: u32, generation: u32 },

    // ─── Identity ────────────────────────────────────────────────────────────
    #[error("token not found: {token:#x}")]
    NotFound { token: Token },

    #[error("wrong node kind: expected {expected}, found {found}")]
    WrongKind { expected: Derived, found: Derived },

    #[error("object is not a node")]
    NotNode,
}

/// Convenience alias used across the workspace.
pub type SkeinResult<T> = Result<T, SkeinError>;
