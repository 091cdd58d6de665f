//! Infrastructure layer for dagflow.
//!
//! Loads `config.toml` from the data directory and provides the bundled node
//! units that perform real IO: outbound HTTP, webhook alerts, and sandboxed
//! file storage. `dagflow-core` defines the `Node` contract; the units here
//! implement it.

pub mod config;
pub mod nodes;

pub use nodes::{BuiltinError, builtin_registry};
