use skein_heap::SharedHeap;
use skein_map::{Change, NodeMap, NodeMapIter};
use skein_node::{Lifecycle, Node, NodeArena, NodeId, StrongSlot, WeakSlot};
use skein_types::error::{SkeinError, SkeinResult};
use skein_types::primitives::{Form, Token};
use skein_types::tags::{Derived, Usage};
use skein_yarn::{Readout, Yarn};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::object::{Object, Row};

/// One database instance: node storage, the token registry, and the heap
/// both are accounted to.
///
/// Every binding holds one strong reference on its node. Unbinding a token
/// releases that reference; [`Store::release_all_bindings`] releases all of
/// them at once. Nodes created through the store come back as
/// [`StrongSlot`]s which the caller must hand to [`Store::release`].
pub struct Store {
    node: Node,
    config: StoreConfig,
    arena: NodeArena<Object>,
    map: NodeMap,
}

impl Store {
    /// Open a store with the heap described by `config`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let heap = config.heap.build();
        Self::open_with_heap(config, heap)
    }

    /// Open a store whose nodes and registry are accounted to `heap`.
    pub fn open_with_heap(config: StoreConfig, heap: SharedHeap) -> StoreResult<Self> {
        config.validate()?;
        let map = NodeMap::with_slots(
            Usage::Member,
            heap.clone(),
            heap.clone(),
            config.registry.start_slots,
        )?;
        let store = Self {
            node: Node::new(Usage::Member, heap.clone(), Derived::Store),
            arena: NodeArena::new(Usage::Member, heap),
            map,
            config,
        };
        info!(slots = store.map.slots(), "store opened");
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn heap(&self) -> &SharedHeap {
        self.node.heap()
    }

    pub fn arena(&self) -> &NodeArena<Object> {
        &self.arena
    }

    pub fn binding_count(&self) -> usize {
        self.map.len()
    }

    // ─── Node creation ───────────────────────────────────────────────────────

    fn adopt(&mut self, mut object: Object) -> SkeinResult<StrongSlot> {
        if let Err(err) = self.node.check_open("create node in") {
            object.close()?;
            return Err(err);
        }
        self.arena.insert(object)
    }

    /// Allocate a yarn with room for `initial_capacity` bytes.
    pub fn allocate_yarn(&mut self, initial_capacity: usize) -> SkeinResult<StrongSlot> {
        self.node.check_open("allocate yarn in")?;
        let yarn = Yarn::with_capacity(Usage::Heap, self.heap().clone(), initial_capacity)?
            .with_growth(self.config.yarn.growth);
        self.adopt(Object::Yarn(yarn))
    }

    /// Allocate a yarn with the configured default capacity.
    pub fn allocate_default_yarn(&mut self) -> SkeinResult<StrongSlot> {
        self.allocate_yarn(self.config.yarn.initial_capacity)
    }

    pub fn create_row(&mut self) -> SkeinResult<StrongSlot> {
        let row = Row::new(Usage::Heap, self.heap().clone()).with_growth(self.config.yarn.growth);
        self.adopt(Object::Row(row))
    }

    pub fn object(&self, id: NodeId) -> SkeinResult<&Object> {
        self.arena.get_open(id, "read")
    }

    pub fn yarn(&self, id: NodeId) -> SkeinResult<&Yarn> {
        self.arena.get_open(id, "read")?.as_yarn()
    }

    pub fn yarn_mut(&mut self, id: NodeId) -> SkeinResult<&mut Yarn> {
        self.arena.get_open_mut(id, "write")?.as_yarn_mut()
    }

    pub fn row(&self, id: NodeId) -> SkeinResult<&Row> {
        self.arena.get_open(id, "read")?.as_row()
    }

    pub fn row_mut(&mut self, id: NodeId) -> SkeinResult<&mut Row> {
        self.arena.get_open_mut(id, "write")?.as_row_mut()
    }

    // ─── References ──────────────────────────────────────────────────────────

    pub fn strong(&mut self, id: NodeId) -> SkeinResult<StrongSlot> {
        self.arena.strong(id)
    }

    pub fn weak(&mut self, id: NodeId) -> SkeinResult<WeakSlot> {
        self.arena.weak(id)
    }

    pub fn release(&mut self, slot: &mut StrongSlot) -> SkeinResult<()> {
        self.arena.release(slot)
    }

    pub fn release_weak(&mut self, slot: &mut WeakSlot) -> SkeinResult<()> {
        self.arena.release_weak(slot)
    }

    pub fn upgrade(&self, slot: &WeakSlot) -> Option<&Object> {
        self.arena.upgrade(slot)
    }

    // ─── Token registry ──────────────────────────────────────────────────────

    /// Borrow the node bound to `token`.
    pub fn resolve_token(&self, token: Token) -> Option<&Object> {
        self.arena.get(self.map.get_node(token)?)
    }

    pub fn resolve_id(&self, token: Token) -> Option<NodeId> {
        self.map.get_node(token)
    }

    /// Like [`Store::resolve_id`], for callers that require the binding.
    pub fn require_token(&self, token: Token) -> SkeinResult<NodeId> {
        self.map.get_node(token).ok_or(SkeinError::NotFound { token })
    }

    /// Bind `token` to `id`, taking a strong reference for the binding. A
    /// node previously bound to `token` loses its binding reference.
    pub fn bind_token(&mut self, token: Token, id: NodeId) -> SkeinResult<()> {
        let previous = self.map.get_node(token);
        if previous == Some(id) {
            return Ok(());
        }
        self.arena.add_strong_ref(id)?;
        if let Err(err) = self.map.add_node(token, id) {
            self.arena.cut_strong_ref(id)?;
            return Err(err);
        }
        if let Some(old) = previous {
            self.arena.cut_strong_ref(old)?;
        }
        Ok(())
    }

    /// Remove the binding for `token` and release its reference. Returns
    /// whether a binding existed. A registry that refuses the unbind reports
    /// the error and keeps the binding and its reference.
    pub fn unbind_token(&mut self, token: Token) -> SkeinResult<bool> {
        let Some(id) = self.map.get_node(token) else {
            return Ok(false);
        };
        if !self.map.cut_node(token)? {
            return Ok(false);
        }
        self.arena.cut_strong_ref(id)?;
        Ok(true)
    }

    /// Remove every binding, releasing each binding reference. Returns the
    /// number of bindings removed.
    pub fn release_all_bindings(&mut self) -> SkeinResult<usize> {
        let released = self.map.cut_all_nodes(&mut self.arena)?;
        info!(released, "all bindings released");
        Ok(released)
    }

    /// Cursor over `(token, node)` bindings in unspecified order.
    pub fn iterate_bindings(&mut self) -> Bindings<'_> {
        Bindings {
            iter: self.map.iter(),
            arena: &mut self.arena,
        }
    }

    // ─── Properties ──────────────────────────────────────────────────────────

    /// Store `bytes` as the `column` property of the row bound to `row`.
    pub fn set_property(
        &mut self,
        row: Token,
        column: Token,
        bytes: &[u8],
        form: Form,
    ) -> SkeinResult<()> {
        let id = self.require_token(row)?;
        self.row_mut(id)?.set_cell(column, bytes, form)
    }

    /// Copy the `column` property of the row bound to `row` into `out`.
    pub fn get_property(&self, row: Token, column: Token, out: &mut Yarn) -> SkeinResult<Readout> {
        let id = self.require_token(row)?;
        self.row(id)?.read_cell_into(column, out)
    }

    /// Borrow the `column` property of the row bound to `row`.
    pub fn property(&self, row: Token, column: Token) -> SkeinResult<Option<&Yarn>> {
        let id = self.require_token(row)?;
        Ok(self.row(id)?.cell(column))
    }
}

impl Lifecycle for Store {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    /// Release every binding, close the registry, then close node storage.
    fn close_body(&mut self) {
        let released = match self.map.close_map(&mut self.arena) {
            Ok(released) => released,
            Err(err) => {
                warn!(%err, "token registry close failed");
                0
            }
        };
        let still_used = self
            .arena
            .iter()
            .filter(|(_, object)| object.node().uses() > 0)
            .count();
        if still_used > 0 {
            warn!(still_used, "store closed while nodes are still referenced");
        }
        let nodes = self.arena.len();
        if let Err(err) = self.arena.close() {
            warn!(%err, "node arena close failed");
        }
        debug!(nodes, "node storage closed");
        info!(released, "store closed");
    }
}

/// Binding cursor returned by [`Store::iterate_bindings`].
///
/// The cursor borrows the store mutably, so the only mutation possible
/// while it is alive is [`Bindings::remove_current`].
pub struct Bindings<'a> {
    iter: NodeMapIter<'a>,
    arena: &'a mut NodeArena<Object>,
}

impl Bindings<'_> {
    /// Advance to the next binding.
    pub fn next_binding(&mut self) -> Option<(Token, NodeId)> {
        match self.iter.next() {
            Change::Here { key, val } => Some((key, val)),
            Change::Cut { .. } | Change::End => None,
        }
    }

    /// The node under the cursor, if the cursor rests on a live binding.
    pub fn current(&self) -> Option<(Token, &Object)> {
        match self.iter.here() {
            Change::Here { key, val } => Some((key, self.arena.get(val)?)),
            _ => None,
        }
    }

    /// Unbind the binding under the cursor and release its reference.
    /// Returns `false` when there is nothing to remove.
    pub fn remove_current(&mut self) -> SkeinResult<bool> {
        if !matches!(self.iter.here(), Change::Here { .. }) {
            return Ok(false);
        }
        match self.iter.cut_here()? {
            Change::Cut { val, .. } => {
                self.arena.cut_strong_ref(val)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Iterator for Bindings<'_> {
    type Item = (Token, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_binding()
    }
}
