//! Yarns: refcounted growable byte buffers for skein.
//!
//! A [`Yarn`] is a node whose payload is a single buffer descriptor
//! ([`YarnBody`]). Content crosses the engine boundary either by alias
//! (borrowing the bytes) or by explicit copy-out into a destination yarn.

pub mod body;
pub mod yarn;

pub use body::{Growth, YarnBody};
pub use yarn::{Readout, Transfer, Yarn};
