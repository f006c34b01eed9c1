//! Shared types for the skein node runtime: tokens, node tags and states,
//! content forms, constants, and the common error enum.

pub mod constants;
pub mod error;
pub mod primitives;
pub mod tags;
