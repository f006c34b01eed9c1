//! Integer-keyed maps for skein.
//!
//! [`IntMap`] is the chained hash map primitive; [`NodeMap`] layers the
//! token registry on top of it, binding tokens to nodes in a
//! [`NodeArena`](skein_node::NodeArena).

pub mod change;
pub mod int_map;
pub mod node_map;

pub use change::Change;
pub use int_map::{IntMap, IntMapIter};
pub use node_map::{NodeMap, NodeMapIter};
