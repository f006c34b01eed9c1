use std::mem;

use skein_heap::{Heap, SharedHeap};
use skein_types::error::{SkeinError, SkeinResult};
use skein_types::tags::{Derived, Usage};
use tracing::{debug, trace, warn};

use crate::lifecycle::Lifecycle;
use crate::node::{Node, Release};
use crate::slot::{NodeId, StrongSlot, WeakSlot};

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Owner of node storage, addressed by generational [`NodeId`]s.
///
/// The arena applies the reference-count discipline: when the last strong
/// reference to a node goes away the node is closed, and when the last
/// reference of any kind goes away a heap-usage node is destroyed and its
/// slot recycled. Nodes with any other usage stay in place, dead, until
/// their owner reclaims them with [`NodeArena::take`].
pub struct NodeArena<T: Lifecycle> {
    node: Node,
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    live: usize,
}

impl<T: Lifecycle> NodeArena<T> {
    /// Create an empty arena whose slot storage is accounted to `heap`.
    pub fn new(usage: Usage, heap: SharedHeap) -> Self {
        Self {
            node: Node::new(usage, heap, Derived::Arena),
            entries: Vec::new(),
            free_head: None,
            live: 0,
        }
    }

    fn entry_size() -> usize {
        mem::size_of::<Entry<T>>()
    }

    /// Number of nodes currently stored (including dead non-heap nodes).
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Move `value` into the arena and return the creator's strong
    /// reference. On failure the value is closed and dropped.
    pub fn insert(&mut self, mut value: T) -> SkeinResult<StrongSlot> {
        let ready = self
            .node
            .check_open("insert into")
            .and_then(|_| value.node().check_open("insert"))
            .and_then(|_| self.vacant_index());
        let index = match ready {
            Ok(index) => index,
            Err(err) => {
                if let Err(close_err) = value.close() {
                    warn!(%close_err, "close of refused node failed");
                }
                return Err(err);
            }
        };

        value.node_mut().add_strong_ref()?;
        let generation = match &self.entries[index as usize] {
            Entry::Vacant {
                generation,
                next_free,
            } => {
                self.free_head = *next_free;
                *generation
            }
            Entry::Occupied { .. } => unreachable!("vacant_index returned an occupied slot"),
        };
        self.entries[index as usize] = Entry::Occupied { generation, value };
        self.live += 1;

        let id = NodeId { index, generation };
        trace!(?id, "node inserted");
        Ok(StrongSlot::holding(id))
    }

    /// Index of a vacant entry, growing the entry table if none is free.
    fn vacant_index(&mut self) -> SkeinResult<u32> {
        if let Some(index) = self.free_head {
            return Ok(index);
        }
        let index = u32::try_from(self.entries.len()).map_err(|_| SkeinError::OutOfMemory {
            requested: Self::entry_size(),
            available: 0,
        })?;
        let size = Self::entry_size();
        self.node.heap().grant(size)?;
        if self.entries.try_reserve(1).is_err() {
            self.node.heap().release(size);
            return Err(SkeinError::OutOfMemory {
                requested: size,
                available: 0,
            });
        }
        self.entries.push(Entry::Vacant {
            generation: 0,
            next_free: None,
        });
        self.free_head = Some(index);
        Ok(index)
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    /// The node behind `id`, in whatever access state it is in.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.entries.get(id.index as usize)? {
            Entry::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.entries.get_mut(id.index as usize)? {
            Entry::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// The node behind `id` if it is open.
    pub fn get_open(&self, id: NodeId, operation: &'static str) -> SkeinResult<&T> {
        let value = self.get(id).ok_or_else(|| stale(id))?;
        value.node().check_open(operation)?;
        Ok(value)
    }

    pub fn get_open_mut(&mut self, id: NodeId, operation: &'static str) -> SkeinResult<&mut T> {
        let value = self.get_mut(id).ok_or_else(|| stale(id))?;
        value.node().check_open(operation)?;
        Ok(value)
    }

    fn live_mut(&mut self, id: NodeId) -> SkeinResult<&mut T> {
        self.get_mut(id).ok_or_else(|| stale(id))
    }

    /// Iterate over stored nodes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    NodeId {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }

    // ─── Reference counting ──────────────────────────────────────────────────

    pub fn add_strong_ref(&mut self, id: NodeId) -> SkeinResult<u32> {
        self.live_mut(id)?.node_mut().add_strong_ref()
    }

    pub fn add_weak_ref(&mut self, id: NodeId) -> SkeinResult<u32> {
        self.live_mut(id)?.node_mut().add_weak_ref()
    }

    /// Release one strong reference, closing and destroying as needed.
    pub fn cut_strong_ref(&mut self, id: NodeId) -> SkeinResult<Release> {
        let release = self.live_mut(id)?.node_mut().cut_strong_ref();
        self.settle(id, release);
        Ok(release)
    }

    /// Release one weak reference, destroying the node if it was the last.
    pub fn cut_weak_ref(&mut self, id: NodeId) -> SkeinResult<Release> {
        let release = self.live_mut(id)?.node_mut().cut_weak_ref();
        self.settle(id, release);
        Ok(release)
    }

    fn settle(&mut self, id: NodeId, release: Release) {
        if release == Release::Alive {
            return;
        }
        if let Some(value) = self.get_mut(id) {
            if value.node().is_open() {
                if let Err(err) = value.close() {
                    warn!(?id, %err, "close at last release failed");
                }
            }
        }
        if release == Release::Gone {
            self.destroy(id);
        }
    }

    fn destroy(&mut self, id: NodeId) {
        let index = id.index as usize;
        let heap_usage = match &mut self.entries[index] {
            Entry::Occupied { value, .. } => {
                value.node_mut().mark_dead();
                value.node().usage().is_heap()
            }
            Entry::Vacant { .. } => return,
        };
        if !heap_usage {
            debug!(?id, "dead node left for its owner");
            return;
        }
        let old = self.vacate(id);
        drop(old);
        debug!(?id, "node destroyed");
    }

    fn vacate(&mut self, id: NodeId) -> Option<T> {
        let vacant = Entry::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        match mem::replace(&mut self.entries[id.index as usize], vacant) {
            Entry::Occupied { value, .. } => {
                self.free_head = Some(id.index);
                self.live -= 1;
                Some(value)
            }
            entry @ Entry::Vacant { .. } => {
                self.entries[id.index as usize] = entry;
                None
            }
        }
    }

    /// Hand a closed node back to its owner, freeing the slot.
    ///
    /// Used for non-heap nodes, which the arena never frees by itself.
    /// Outstanding ids for the node become stale.
    pub fn take(&mut self, id: NodeId) -> SkeinResult<T> {
        let value = self.get(id).ok_or_else(|| stale(id))?;
        if !value.node().is_shut() {
            return Err(SkeinError::InvalidState {
                access: value.node().access(),
                operation: "take",
            });
        }
        self.vacate(id).ok_or_else(|| stale(id))
    }

    // ─── Slots ───────────────────────────────────────────────────────────────

    /// Take a new strong reference on `id`.
    pub fn strong(&mut self, id: NodeId) -> SkeinResult<StrongSlot> {
        self.add_strong_ref(id)?;
        Ok(StrongSlot::holding(id))
    }

    /// Take a new weak reference on `id`.
    pub fn weak(&mut self, id: NodeId) -> SkeinResult<WeakSlot> {
        self.add_weak_ref(id)?;
        Ok(WeakSlot::holding(id))
    }

    /// Point `slot` at `incoming`: take the new strong reference, then
    /// release whatever the slot held. Self-assignment is a no-op and a
    /// failed acquisition leaves the slot untouched.
    pub fn slot_strong(
        &mut self,
        slot: &mut StrongSlot,
        incoming: Option<NodeId>,
    ) -> SkeinResult<()> {
        if slot.id() == incoming {
            return Ok(());
        }
        if let Some(id) = incoming {
            self.add_strong_ref(id)?;
        }
        if let Some(old) = slot.replace(incoming) {
            self.cut_strong_ref(old)?;
        }
        Ok(())
    }

    /// Weak counterpart of [`NodeArena::slot_strong`].
    pub fn slot_weak(&mut self, slot: &mut WeakSlot, incoming: Option<NodeId>) -> SkeinResult<()> {
        if slot.id() == incoming {
            return Ok(());
        }
        if let Some(id) = incoming {
            self.add_weak_ref(id)?;
        }
        if let Some(old) = slot.replace(incoming) {
            self.cut_weak_ref(old)?;
        }
        Ok(())
    }

    /// Empty a strong slot, releasing its reference.
    pub fn release(&mut self, slot: &mut StrongSlot) -> SkeinResult<()> {
        self.slot_strong(slot, None)
    }

    /// Empty a weak slot, releasing its reference.
    pub fn release_weak(&mut self, slot: &mut WeakSlot) -> SkeinResult<()> {
        self.slot_weak(slot, None)
    }

    /// Resolve a weak slot to a usable node. Nodes pending death (no strong
    /// references left) are not usable.
    pub fn upgrade(&self, slot: &WeakSlot) -> Option<&T> {
        let id = slot.id()?;
        let value = self.get(id)?;
        if value.node().is_open() && value.node().uses() > 0 {
            Some(value)
        } else {
            debug!(?id, access = %value.node().access(), "weak observer found unusable node");
            None
        }
    }
}

fn stale(id: NodeId) -> SkeinError {
    SkeinError::StaleNode {
        index: id.index,
        generation: id.generation,
    }
}

impl<T: Lifecycle> Lifecycle for NodeArena<T> {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    /// Close every stored node and free all slots.
    fn close_body(&mut self) {
        let mut still_used = 0usize;
        for entry in &mut self.entries {
            if let Entry::Occupied { value, .. } = entry {
                if value.node().uses() > 0 && value.node().usage().is_heap() {
                    still_used += 1;
                }
                if let Err(err) = value.close() {
                    warn!(%err, "node close failed during arena teardown");
                }
                value.node_mut().mark_dead();
            }
        }
        if still_used > 0 {
            warn!(still_used, "arena closed with strongly referenced nodes");
        }
        let slots = self.entries.len();
        self.entries.clear();
        self.node.heap().release(slots * Self::entry_size());
        self.free_head = None;
        self.live = 0;
        debug!(slots, "arena closed");
    }
}
