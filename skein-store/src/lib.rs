//! Store facade for the skein node runtime.
//!
//! A [`Store`] owns node storage and the token registry for one database
//! instance and exposes the in-process surface used by row and property
//! accessors: token resolution and binding, binding iteration, yarn
//! allocation, and row properties.

pub mod config;
pub mod error;
pub mod logging;
pub mod object;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use object::{Object, Row};
pub use store::{Bindings, Store};
