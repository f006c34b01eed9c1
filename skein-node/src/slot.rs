use std::fmt;

/// Generational handle to a node stored in a [`NodeArena`](crate::arena::NodeArena).
///
/// A `NodeId` is a borrowed, non-owning reference: copying one does not
/// change any count. Once the node is destroyed its slot is reused under a
/// new generation, so stale ids resolve to nothing instead of dangling.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

/// Owner of one strong reference.
///
/// Assign through [`NodeArena::slot_strong`](crate::arena::NodeArena::slot_strong),
/// which releases the old reference and takes the new one in a single step.
/// A slot must be emptied before it is dropped.
#[derive(Default)]
pub struct StrongSlot {
    id: Option<NodeId>,
}

/// Owner of one weak reference. Keeps a node observable, never alive.
#[derive(Default)]
pub struct WeakSlot {
    id: Option<NodeId>,
}

macro_rules! slot_common {
    ($slot:ident, $what:literal) => {
        impl $slot {
            /// An empty slot.
            pub fn empty() -> Self {
                Self { id: None }
            }

            pub(crate) fn holding(id: NodeId) -> Self {
                Self { id: Some(id) }
            }

            pub fn id(&self) -> Option<NodeId> {
                self.id
            }

            pub fn is_empty(&self) -> bool {
                self.id.is_none()
            }

            pub(crate) fn replace(&mut self, id: Option<NodeId>) -> Option<NodeId> {
                std::mem::replace(&mut self.id, id)
            }

            /// Give up the slot without releasing its reference. The caller
            /// takes over responsibility for the count.
            pub fn into_id(mut self) -> Option<NodeId> {
                self.id.take()
            }
        }

        impl fmt::Debug for $slot {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($slot)).field(&self.id).finish()
            }
        }

        impl Drop for $slot {
            fn drop(&mut self) {
                if !std::thread::panicking() {
                    debug_assert!(
                        self.id.is_none(),
                        concat!($what, " slot dropped while holding {:?}"),
                        self.id
                    );
                }
            }
        }
    };
}

slot_common!(StrongSlot, "strong");
slot_common!(WeakSlot, "weak");
