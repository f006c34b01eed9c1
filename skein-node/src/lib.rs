//! Node lifecycle and ownership for skein.
//!
//! Every object in the runtime embeds a [`Node`](node::Node) header carrying
//! its identity tags, access state, and strong/weak counts. Objects live in a
//! [`NodeArena`](arena::NodeArena) and are addressed by generational
//! [`NodeId`](slot::NodeId)s; [`StrongSlot`](slot::StrongSlot) and
//! [`WeakSlot`](slot::WeakSlot) own references explicitly.

pub mod arena;
pub mod lifecycle;
pub mod node;
pub mod slot;

pub use arena::NodeArena;
pub use lifecycle::Lifecycle;
pub use node::{Node, Release};
pub use slot::{NodeId, StrongSlot, WeakSlot};
