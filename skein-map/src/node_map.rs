use skein_heap::SharedHeap;
use skein_node::{Lifecycle, Node, NodeArena, NodeId};
use skein_types::constants::NODE_MAP_START_SLOTS;
use skein_types::error::SkeinResult;
use skein_types::primitives::Token;
use skein_types::tags::{Derived, Usage};
use tracing::{debug, trace, warn};

use crate::change::Change;
use crate::int_map::{IntMap, IntMapIter};

/// Token registry: maps tokens to nodes stored in a [`NodeArena`].
///
/// The registry is a lookup index, not an owner. Binding a node does not
/// take a reference and unbinding one does not release it. The exception is
/// [`NodeMap::cut_all_nodes`], the store-teardown path, which releases one
/// strong reference per entry on behalf of the store.
pub struct NodeMap {
    map: IntMap<NodeId>,
}

impl NodeMap {
    /// Create a registry pre-sized for a typical mail-folder store.
    pub fn new(usage: Usage, heap: SharedHeap, slot_heap: SharedHeap) -> SkeinResult<Self> {
        Self::with_slots(usage, heap, slot_heap, NODE_MAP_START_SLOTS)
    }

    pub fn with_slots(
        usage: Usage,
        heap: SharedHeap,
        slot_heap: SharedHeap,
        slots: usize,
    ) -> SkeinResult<Self> {
        let mut map = IntMap::new(usage, heap, slot_heap, slots)?;
        map.node_mut().set_derived(Derived::NodeMap);
        Ok(Self { map })
    }

    /// Bind `token` to `node`, replacing any previous binding. The previous
    /// node, if any, is not released.
    pub fn add_node(&mut self, token: Token, node: NodeId) -> SkeinResult<()> {
        let previous = self.map.put(token, node)?;
        match previous {
            Some(old) if old != node => trace!(token, ?old, ?node, "token rebound"),
            _ => trace!(token, ?node, "token bound"),
        }
        Ok(())
    }

    /// Node bound to `token`. The handle is borrowed: take a strong
    /// reference through the arena before keeping it past further registry
    /// mutation.
    pub fn get_node(&self, token: Token) -> Option<NodeId> {
        self.map.get(token)
    }

    /// Unbind `token`. Returns whether a binding was removed. The node is
    /// not released. A closed or frozen map refuses with an error and keeps
    /// its bindings.
    pub fn cut_node(&mut self, token: Token) -> SkeinResult<bool> {
        let removed = self.map.cut(token)?.is_some();
        trace!(token, removed, "token unbound");
        Ok(removed)
    }

    /// Unbind every token and release one strong reference on each bound
    /// node. Returns the number of bindings cleared.
    ///
    /// Each binding is cut before its node is released, so the registry
    /// never points at a node the release destroyed. A closed or frozen map
    /// refuses up front and nothing is released.
    pub fn cut_all_nodes<T: Lifecycle>(&mut self, arena: &mut NodeArena<T>) -> SkeinResult<usize> {
        self.map.node().check_mutable("cut all from")?;
        let mut cleared = 0;
        let mut iter = self.map.iter();
        let mut change = iter.first();
        while let Change::Here { .. } = change {
            if let Change::Cut { key, val } = iter.cut_here()? {
                cleared += 1;
                if let Err(err) = arena.cut_strong_ref(val) {
                    warn!(token = key, node = ?val, %err, "bound node could not be released");
                }
            }
            change = iter.next();
        }
        debug!(cleared, "all bindings released");
        Ok(cleared)
    }

    /// Release every binding, then close the registry.
    ///
    /// Teardown proceeds even when the bindings cannot be released (a frozen
    /// map); their nodes are then left to the arena's own close.
    pub fn close_map<T: Lifecycle>(&mut self, arena: &mut NodeArena<T>) -> SkeinResult<usize> {
        let cleared = if self.map.node().is_open() {
            match self.cut_all_nodes(arena) {
                Ok(cleared) => cleared,
                Err(err) => {
                    warn!(bindings = self.map.len(), %err, "bindings not released before close");
                    0
                }
            }
        } else {
            0
        };
        self.close()?;
        Ok(cleared)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn slots(&self) -> usize {
        self.map.slots()
    }

    /// Snapshot of current bindings in implementation-defined order.
    pub fn bindings(&self) -> impl Iterator<Item = (Token, NodeId)> + '_ {
        self.map.entries()
    }

    /// Cursor over bindings that may unbind the entry it rests on.
    pub fn iter(&mut self) -> NodeMapIter<'_> {
        NodeMapIter {
            inner: self.map.iter(),
        }
    }
}

impl Lifecycle for NodeMap {
    fn node(&self) -> &Node {
        self.map.node()
    }

    fn node_mut(&mut self) -> &mut Node {
        self.map.node_mut()
    }

    fn close_body(&mut self) {
        if !self.map.is_empty() {
            warn!(
                bindings = self.map.len(),
                "node map closed with live bindings; bound nodes were not released"
            );
        }
        self.map.close_body();
    }
}

/// Typed cursor over a [`NodeMap`].
pub struct NodeMapIter<'a> {
    inner: IntMapIter<'a, NodeId>,
}

#[allow(clippy::should_implement_trait)]
impl NodeMapIter<'_> {
    pub fn first(&mut self) -> Change<NodeId> {
        self.inner.first()
    }

    pub fn next(&mut self) -> Change<NodeId> {
        self.inner.next()
    }

    pub fn here(&self) -> Change<NodeId> {
        self.inner.here()
    }

    /// Unbind the entry under the cursor without releasing its node.
    pub fn cut_here(&mut self) -> SkeinResult<Change<NodeId>> {
        self.inner.cut_here()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use skein_heap::SystemHeap;
    use skein_node::StrongSlot;
    use skein_types::error::SkeinError;
    use std::collections::HashMap;

    struct Fixture {
        heap: SharedHeap,
        arena: NodeArena<Node>,
        map: NodeMap,
    }

    impl Fixture {
        fn new() -> Self {
            let heap = SystemHeap::shared();
            Self {
                arena: NodeArena::new(Usage::Member, heap.clone()),
                map: NodeMap::new(Usage::Member, heap.clone(), heap.clone()).unwrap(),
                heap,
            }
        }

        /// Insert a node and hand its creator reference to the caller.
        fn node(&mut self) -> StrongSlot {
            let node = Node::new(Usage::Heap, self.heap.clone(), Derived::Node);
            self.arena.insert(node).unwrap()
        }

        /// Insert a node whose creator reference the registry will release.
        fn bound(&mut self, token: Token) -> NodeId {
            let id = self.node().into_id().unwrap();
            self.map.add_node(token, id).unwrap();
            id
        }

        fn close(mut self) {
            self.map.close_map(&mut self.arena).unwrap();
            self.arena.close().unwrap();
        }
    }

    #[test]
    fn test_new_map_is_presized_and_tagged() {
        let fx = Fixture::new();
        assert_eq!(fx.map.slots(), NODE_MAP_START_SLOTS);
        assert_eq!(fx.map.node().derived(), Derived::NodeMap);
        fx.close();
    }

    #[test]
    fn test_add_get_does_not_touch_refcount() {
        let mut fx = Fixture::new();
        let id = fx.bound(1);
        assert_eq!(fx.map.get_node(1), Some(id));
        assert_eq!(fx.arena.get(id).unwrap().uses(), 1);
        assert_eq!(fx.map.get_node(2), None);
        fx.close();
    }

    #[test]
    fn test_rebind_replaces_without_release() {
        let mut fx = Fixture::new();
        let mut a = fx.node();
        let mut b = fx.node();
        let (a_id, b_id) = (a.id().unwrap(), b.id().unwrap());

        fx.map.add_node(5, a_id).unwrap();
        fx.map.add_node(5, b_id).unwrap();
        assert_eq!(fx.map.get_node(5), Some(b_id));
        assert_eq!(fx.map.len(), 1);
        assert_eq!(fx.arena.get(a_id).unwrap().uses(), 1);

        assert!(fx.map.cut_node(5).unwrap());
        fx.arena.release(&mut a).unwrap();
        fx.arena.release(&mut b).unwrap();
        fx.close();
    }

    #[test]
    fn test_unbind_is_idempotent_and_does_not_release() {
        let mut fx = Fixture::new();
        let mut slot = fx.node();
        let id = slot.id().unwrap();
        fx.map.add_node(9, id).unwrap();

        assert!(fx.map.cut_node(9).unwrap());
        assert!(!fx.map.cut_node(9).unwrap());
        assert_eq!(fx.map.get_node(9), None);
        assert_eq!(fx.arena.get(id).unwrap().uses(), 1);

        fx.arena.release(&mut slot).unwrap();
        fx.close();
    }

    #[test]
    fn test_cut_all_nodes_releases_and_counts() {
        let mut fx = Fixture::new();
        let ids: Vec<NodeId> = (10..20).map(|t| fx.bound(t)).collect();

        // An extra strong reference keeps one node alive past the release.
        let mut keep = fx.arena.strong(ids[3]).unwrap();

        assert_eq!(fx.map.cut_all_nodes(&mut fx.arena).unwrap(), 10);
        assert!(fx.map.is_empty());
        assert_eq!(fx.map.iter().first(), Change::End);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(fx.arena.contains(*id), i == 3);
        }

        fx.arena.release(&mut keep).unwrap();
        assert!(fx.arena.is_empty());
        fx.close();
    }

    #[test]
    fn test_frozen_map_refuses_bulk_release_and_keeps_nodes() {
        let mut fx = Fixture::new();
        let id = fx.bound(1);
        fx.map.node_mut().freeze();

        assert!(matches!(
            fx.map.cut_all_nodes(&mut fx.arena),
            Err(SkeinError::Frozen { .. })
        ));
        assert_eq!(fx.map.get_node(1), Some(id));
        assert_eq!(fx.arena.get(id).unwrap().uses(), 1);

        assert!(matches!(fx.map.cut_node(1), Err(SkeinError::Frozen { .. })));
        assert_eq!(fx.map.get_node(1), Some(id));

        fx.map.node_mut().thaw();
        assert_eq!(fx.map.cut_all_nodes(&mut fx.arena).unwrap(), 1);
        assert!(!fx.arena.contains(id));
        fx.close();
    }

    #[test]
    fn test_close_map_proceeds_when_frozen() {
        let mut fx = Fixture::new();
        let id = fx.bound(2);
        fx.map.node_mut().freeze();

        assert_eq!(fx.map.close_map(&mut fx.arena).unwrap(), 0);
        assert!(fx.map.node().is_shut());
        // The node still holds its binding reference until the arena closes.
        assert_eq!(fx.arena.get(id).unwrap().uses(), 1);
        fx.arena.close().unwrap();
    }

    #[test]
    fn test_closed_map_refuses_unbind() {
        let mut fx = Fixture::new();
        fx.map.close_map(&mut fx.arena).unwrap();
        assert!(matches!(
            fx.map.cut_node(1),
            Err(SkeinError::InvalidState { .. })
        ));
        fx.arena.close().unwrap();
    }

    #[test]
    fn test_bind_remove_during_iteration_scenario() {
        let mut fx = Fixture::new();
        let a = fx.bound(1);
        let b = fx.bound(2);
        let c = fx.bound(3);

        let mut visited = Vec::new();
        let mut removed = None;
        {
            let mut iter = fx.map.iter();
            let mut change = iter.first();
            while let Change::Here { key, val } = change {
                if key == 2 {
                    removed = iter.cut_here().unwrap().key();
                } else {
                    visited.push(val);
                }
                change = iter.next();
            }
        }
        visited.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(visited, expected);
        assert_eq!(removed, Some(2));
        assert_eq!(fx.map.get_node(2), None);

        // The unbound node still carries its creator reference.
        assert_eq!(fx.map.cut_all_nodes(&mut fx.arena).unwrap(), 2);
        assert_eq!(fx.arena.len(), 1);
        assert_eq!(fx.arena.get(b).unwrap().uses(), 1);
        fx.arena.cut_strong_ref(b).unwrap();
        assert!(fx.arena.is_empty());
        fx.close();
    }

    #[test]
    fn test_cursor_cut_leaves_node_alive() {
        let mut fx = Fixture::new();
        let id = fx.bound(4);
        {
            let mut iter = fx.map.iter();
            assert_eq!(iter.first(), Change::Here { key: 4, val: id });
            assert_eq!(iter.cut_here().unwrap(), Change::Cut { key: 4, val: id });
            assert_eq!(iter.here(), Change::Cut { key: 4, val: id });
            assert!(iter.next().is_end());
        }
        assert!(fx.arena.contains(id));
        fx.arena.cut_strong_ref(id).unwrap();
        fx.close();
    }

    #[test]
    fn test_close_map_releases_bindings() {
        let mut fx = Fixture::new();
        for token in 0..5 {
            fx.bound(token);
        }
        assert_eq!(fx.map.close_map(&mut fx.arena).unwrap(), 5);
        assert!(fx.arena.is_empty());
        assert_eq!(fx.map.get_node(0), None);
        assert_eq!(fx.map.close_map(&mut fx.arena).unwrap(), 0);
        fx.arena.close().unwrap();
    }

    #[test]
    fn test_registry_survives_growth_past_start_slots() {
        let mut fx = Fixture::new();
        let count = NODE_MAP_START_SLOTS as u32 * 3;
        for token in 0..count {
            fx.bound(token);
        }
        assert!(fx.map.slots() >= count as usize);
        for token in 0..count {
            assert!(fx.map.get_node(token).is_some());
        }
        assert_eq!(fx.map.cut_all_nodes(&mut fx.arena).unwrap(), count as usize);
        fx.close();
    }

    proptest! {
        #[test]
        fn prop_last_binding_wins(binds in proptest::collection::vec((0u32..32, 0usize..8), 0..100)) {
            let mut fx = Fixture::new();
            let mut slots: Vec<StrongSlot> = (0..8).map(|_| fx.node()).collect();
            let ids: Vec<NodeId> = slots.iter().map(|s| s.id().unwrap()).collect();
            let mut model = HashMap::new();

            for (token, which) in binds {
                fx.map.add_node(token, ids[which]).unwrap();
                model.insert(token, ids[which]);
            }
            for token in 0..32u32 {
                prop_assert_eq!(fx.map.get_node(token), model.get(&token).copied());
            }
            prop_assert_eq!(fx.map.len(), model.len());

            for token in model.keys() {
                fx.map.cut_node(*token).unwrap();
            }
            for slot in &mut slots {
                fx.arena.release(slot).unwrap();
            }
            fx.close();
        }

        #[test]
        fn prop_iteration_with_removal_visits_each_once(
            n in 0u32..300,
            remove in proptest::collection::vec(any::<bool>(), 300),
        ) {
            let mut fx = Fixture::new();
            for token in 0..n {
                fx.bound(token);
            }

            let mut visited = std::collections::HashSet::new();
            let mut cut = Vec::new();
            {
                let mut iter = fx.map.iter();
                let mut change = iter.first();
                while let Change::Here { key, .. } = change {
                    prop_assert!(visited.insert(key), "token {} visited twice", key);
                    if remove[key as usize] {
                        cut.push(iter.cut_here().unwrap().key().unwrap());
                    }
                    change = iter.next();
                }
            }

            prop_assert_eq!(visited.len(), n as usize);
            prop_assert_eq!(fx.map.len() + cut.len(), n as usize);
            for token in &cut {
                prop_assert_eq!(fx.map.get_node(*token), None);
            }

            // Unbound nodes keep their creator reference through bulk release.
            let remaining = fx.map.len();
            prop_assert_eq!(fx.map.cut_all_nodes(&mut fx.arena).unwrap(), remaining);
            prop_assert_eq!(fx.arena.len(), n as usize - remaining);
            fx.close();
        }
    }
}
