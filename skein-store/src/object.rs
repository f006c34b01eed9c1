use std::collections::BTreeMap;

use skein_heap::SharedHeap;
use skein_node::{Lifecycle, Node};
use skein_types::error::{SkeinError, SkeinResult};
use skein_types::primitives::{Form, Token};
use skein_types::tags::{Derived, Usage};
use skein_yarn::{Growth, Readout, Yarn};
use tracing::warn;

/// Minimal row: a node holding one yarn cell per column token.
pub struct Row {
    node: Node,
    cells: BTreeMap<Token, Yarn>,
    growth: Growth,
}

impl Row {
    pub fn new(usage: Usage, heap: SharedHeap) -> Self {
        Self {
            node: Node::new(usage, heap, Derived::Row),
            cells: BTreeMap::new(),
            growth: Growth::default(),
        }
    }

    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.growth = growth;
        self
    }

    /// Store `bytes` under `column`, creating the cell if needed.
    ///
    /// On failure an existing cell keeps its previous content and no new
    /// cell is left behind.
    pub fn set_cell(&mut self, column: Token, bytes: &[u8], form: Form) -> SkeinResult<()> {
        self.node.check_mutable("set cell of")?;
        if let Some(cell) = self.cells.get_mut(&column) {
            cell.set(bytes, form)?;
        } else {
            let mut cell = Yarn::with_capacity(Usage::Member, self.node.heap().clone(), bytes.len())?
                .with_growth(self.growth);
            if let Err(err) = cell.set(bytes, form) {
                cell.close()?;
                return Err(err);
            }
            self.cells.insert(column, cell);
        }
        self.node.set_dirty();
        Ok(())
    }

    pub fn cell(&self, column: Token) -> Option<&Yarn> {
        if !self.node.is_open() {
            return None;
        }
        self.cells.get(&column)
    }

    /// Copy the cell under `column` into `out`.
    pub fn read_cell_into(&self, column: Token, out: &mut Yarn) -> SkeinResult<Readout> {
        self.node.check_open("read cell of")?;
        self.cells
            .get(&column)
            .ok_or(SkeinError::NotFound { token: column })?
            .read_into(out)
    }

    /// Remove and close the cell under `column`. Returns whether it existed.
    pub fn cut_cell(&mut self, column: Token) -> SkeinResult<bool> {
        self.node.check_mutable("cut cell of")?;
        match self.cells.remove(&column) {
            Some(mut cell) => {
                cell.close()?;
                self.node.set_dirty();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = Token> + '_ {
        self.cells.keys().copied()
    }
}

impl Lifecycle for Row {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    fn close_body(&mut self) {
        for (column, mut cell) in std::mem::take(&mut self.cells) {
            if let Err(err) = cell.close() {
                warn!(column, %err, "row cell close failed");
            }
        }
    }
}

/// Every node kind a store can hold.
pub enum Object {
    Yarn(Yarn),
    Row(Row),
}

impl Object {
    pub fn kind(&self) -> Derived {
        match self {
            Object::Yarn(_) => Derived::Yarn,
            Object::Row(_) => Derived::Row,
        }
    }

    fn wrong_kind(&self, expected: Derived) -> SkeinError {
        if !self.node().is_node() {
            return SkeinError::NotNode;
        }
        SkeinError::WrongKind {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_yarn(&self) -> SkeinResult<&Yarn> {
        match self {
            Object::Yarn(yarn) => Ok(yarn),
            other => Err(other.wrong_kind(Derived::Yarn)),
        }
    }

    pub fn as_yarn_mut(&mut self) -> SkeinResult<&mut Yarn> {
        match self {
            Object::Yarn(yarn) => Ok(yarn),
            other => Err(other.wrong_kind(Derived::Yarn)),
        }
    }

    pub fn as_row(&self) -> SkeinResult<&Row> {
        match self {
            Object::Row(row) => Ok(row),
            other => Err(other.wrong_kind(Derived::Row)),
        }
    }

    pub fn as_row_mut(&mut self) -> SkeinResult<&mut Row> {
        match self {
            Object::Row(row) => Ok(row),
            other => Err(other.wrong_kind(Derived::Row)),
        }
    }
}

impl From<Yarn> for Object {
    fn from(yarn: Yarn) -> Self {
        Object::Yarn(yarn)
    }
}

impl From<Row> for Object {
    fn from(row: Row) -> Self {
        Object::Row(row)
    }
}

impl Lifecycle for Object {
    fn node(&self) -> &Node {
        match self {
            Object::Yarn(yarn) => yarn.node(),
            Object::Row(row) => row.node(),
        }
    }

    fn node_mut(&mut self) -> &mut Node {
        match self {
            Object::Yarn(yarn) => yarn.node_mut(),
            Object::Row(row) => row.node_mut(),
        }
    }

    fn close_body(&mut self) {
        match self {
            Object::Yarn(yarn) => yarn.close_body(),
            Object::Row(row) => row.close_body(),
        }
    }
}
