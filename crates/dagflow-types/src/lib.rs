//! Shared domain types for dagflow.
//!
//! Workflow definitions, node policies, engine configuration, and the
//! definition error taxonomy. Zero infrastructure dependencies -- only serde,
//! serde_json, and thiserror.

pub mod config;
pub mod error;
pub mod workflow;
