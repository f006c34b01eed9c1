use skein_heap::SharedHeap;
use skein_types::error::{SkeinError, SkeinResult};
use skein_types::tags::{Able, Access, Derived, Load, Usage, BASE_NODE};

/// Outcome of releasing one reference on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Strong references remain.
    Alive,
    /// The last strong reference went away; weak references remain.
    /// The node must be closed now and is unusable from here on.
    LastUse,
    /// Both counts reached zero; the node must be destroyed.
    Gone,
}

/// Lifecycle and identity header shared by every node.
///
/// Subtypes embed a `Node` and expose it through
/// [`Lifecycle`](crate::lifecycle::Lifecycle). Counters and state change only
/// through the methods here.
#[derive(Debug)]
pub struct Node {
    heap: SharedHeap,
    base: u16,
    derived: Derived,
    access: Access,
    usage: Usage,
    mutable: Able,
    load: Load,
    /// Strong references.
    uses: u32,
    /// Strong plus weak references.
    refs: u32,
}

impl Node {
    /// Create an open, clean, mutable node with no references.
    pub fn new(usage: Usage, heap: SharedHeap, derived: Derived) -> Self {
        Self {
            heap,
            base: BASE_NODE,
            derived,
            access: Access::Open,
            usage,
            mutable: Able::Enabled,
            load: Load::Clean,
            uses: 0,
            refs: 0,
        }
    }

    // ─── Identity ────────────────────────────────────────────────────────────

    pub fn is_node(&self) -> bool {
        self.base == BASE_NODE
    }

    pub fn derived(&self) -> Derived {
        self.derived
    }

    /// Retag a node whose subtype wraps another subtype (a node map is built
    /// on an int map). Only valid while the node is open.
    pub fn set_derived(&mut self, derived: Derived) {
        debug_assert!(self.is_open(), "retagging a {} node", self.access);
        self.derived = derived;
    }

    /// Succeed when this node is of kind `expected`.
    pub fn expect_kind(&self, expected: Derived) -> SkeinResult<()> {
        if !self.is_node() {
            return Err(SkeinError::NotNode);
        }
        if self.derived != expected {
            return Err(SkeinError::WrongKind {
                expected,
                found: self.derived,
            });
        }
        Ok(())
    }

    /// The heap this node was bound to at construction.
    pub fn heap(&self) -> &SharedHeap {
        &self.heap
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    // ─── Access ──────────────────────────────────────────────────────────────

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_open(&self) -> bool {
        self.access == Access::Open
    }

    pub fn is_closing(&self) -> bool {
        self.access == Access::Closing
    }

    /// Shut or dead: teardown has already run.
    pub fn is_shut(&self) -> bool {
        matches!(self.access, Access::Shut | Access::Dead)
    }

    pub fn is_dead(&self) -> bool {
        self.access == Access::Dead
    }

    pub(crate) fn mark_closing(&mut self) {
        self.access = Access::Closing;
    }

    pub(crate) fn mark_shut(&mut self) {
        self.access = Access::Shut;
    }

    pub(crate) fn mark_dead(&mut self) {
        debug_assert!(self.is_shut(), "marking a {} node dead", self.access);
        self.access = Access::Dead;
    }

    /// Fail with `InvalidState` unless the node is open.
    pub fn check_open(&self, operation: &'static str) -> SkeinResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SkeinError::InvalidState {
                access: self.access,
                operation,
            })
        }
    }

    /// Fail unless the node is open and not frozen.
    pub fn check_mutable(&self, operation: &'static str) -> SkeinResult<()> {
        self.check_open(operation)?;
        if self.mutable == Able::Disabled {
            return Err(SkeinError::Frozen { operation });
        }
        Ok(())
    }

    // ─── Mutability & load ───────────────────────────────────────────────────

    pub fn is_mutable(&self) -> bool {
        self.mutable == Able::Enabled
    }

    pub fn freeze(&mut self) {
        self.mutable = Able::Disabled;
    }

    pub fn thaw(&mut self) {
        self.mutable = Able::Enabled;
    }

    pub fn is_dirty(&self) -> bool {
        self.load == Load::Dirty
    }

    pub fn set_dirty(&mut self) {
        self.load = Load::Dirty;
    }

    pub fn set_clean(&mut self) {
        self.load = Load::Clean;
    }

    // ─── Reference counts ────────────────────────────────────────────────────

    pub fn uses(&self) -> u32 {
        self.uses
    }

    pub fn refs(&self) -> u32 {
        self.refs
    }

    /// Weak references only (`refs - uses`).
    pub fn weak_refs(&self) -> u32 {
        self.refs - self.uses
    }

    /// Take a strong reference. Only open nodes may gain strong references.
    pub fn add_strong_ref(&mut self) -> SkeinResult<u32> {
        self.check_open("add strong ref to")?;
        self.uses += 1;
        self.refs += 1;
        Ok(self.uses)
    }

    /// Take a weak reference. Any node that is not yet dead may be observed.
    pub fn add_weak_ref(&mut self) -> SkeinResult<u32> {
        if self.is_dead() {
            return Err(SkeinError::InvalidState {
                access: self.access,
                operation: "add weak ref to",
            });
        }
        self.refs += 1;
        Ok(self.refs)
    }

    /// Drop a strong reference.
    ///
    /// # Panics
    /// When no strong reference is held.
    pub fn cut_strong_ref(&mut self) -> Release {
        assert!(
            self.uses > 0 && self.refs >= self.uses,
            "strong refcount underflow on {} node (uses {}, refs {})",
            self.derived,
            self.uses,
            self.refs
        );
        self.uses -= 1;
        self.refs -= 1;
        self.settled()
    }

    /// Drop a weak reference.
    ///
    /// # Panics
    /// When no weak reference is held.
    pub fn cut_weak_ref(&mut self) -> Release {
        assert!(
            self.refs > self.uses,
            "weak refcount underflow on {} node (uses {}, refs {})",
            self.derived,
            self.uses,
            self.refs
        );
        self.refs -= 1;
        self.settled()
    }

    fn settled(&self) -> Release {
        if self.refs == 0 {
            Release::Gone
        } else if self.uses == 0 {
            Release::LastUse
        } else {
            Release::Alive
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.is_shut(),
                "{} node dropped while {}: close() must run before destruction",
                self.derived,
                self.access
            );
        }
    }
}
