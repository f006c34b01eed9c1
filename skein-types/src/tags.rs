//! Identity tags and lifecycle states carried by every node.

use std::fmt;

/// Base tag shared by every node (ascii 'Nd').
pub const BASE_NODE: u16 = 0x4E64;

/// Concrete node subtype, used for checked downcasts.
///
/// Discriminants are two ascii characters so a tag is readable in a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Derived {
    /// A bare node with no subtype (ascii 'Nn').
    Node = 0x4E6E,
    /// Integer-keyed hash map (ascii 'iM').
    IntMap = 0x694D,
    /// Token to node registry (ascii 'nM').
    NodeMap = 0x6E4D,
    /// Refcounted byte buffer (ascii 'yR').
    Yarn = 0x7952,
    /// Row with property cells (ascii 'rO').
    Row = 0x724F,
    /// Node arena (ascii 'nA').
    Arena = 0x6E41,
    /// Store facade (ascii 'sT').
    Store = 0x7354,
}

impl Derived {
    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Derived::Node => "node",
            Derived::IntMap => "int map",
            Derived::NodeMap => "node map",
            Derived::Yarn => "yarn",
            Derived::Row => "row",
            Derived::Arena => "arena",
            Derived::Store => "store",
        }
    }
}

impl fmt::Display for Derived {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access state of a node.
///
/// `Open -> Closing -> Shut -> Dead`; only `Open` nodes may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Open,
    Closing,
    Shut,
    Dead,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Access::Open => "open",
            Access::Closing => "closing",
            Access::Shut => "shut",
            Access::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Where a node's backing storage lives.
///
/// Only `Heap` nodes are freed by their arena when the last reference goes
/// away; the others belong to an enclosing owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    Heap,
    Stack,
    Member,
    Global,
    None,
}

impl Usage {
    /// Whether the owner of a node with this usage may free it.
    pub fn is_heap(self) -> bool {
        self == Usage::Heap
    }
}

/// Whether a node's content may currently change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Able {
    Enabled,
    Disabled,
}

/// Whether a node holds changes not yet flushed to backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Load {
    Clean,
    Dirty,
}
