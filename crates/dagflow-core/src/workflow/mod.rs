//! Workflow engine core: definition parsing, DAG execution, and data flow.
//!
//! - `definition` -- YAML/JSON parsing and graph validation entry points
//! - `dag` -- dependency checks, DFS cycle detection, static wave planning
//! - `expression` -- sandboxed expression language for `when` guards
//! - `template` -- `{{ ... }}` resolution over node configs
//! - `context` -- per-run results/errors store
//! - `node` -- the node contract
//! - `registry` -- node type name -> factory
//! - `retry` -- back-off schedule
//! - `executor` -- wave-based concurrent executor

pub mod context;
pub mod dag;
pub mod definition;
pub mod executor;
pub mod expression;
pub mod node;
pub mod registry;
pub mod retry;
pub mod template;
