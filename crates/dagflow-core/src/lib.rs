//! Workflow engine core for dagflow.
//!
//! Everything needed to execute a workflow graph in-process: the sandboxed
//! expression language, template resolution, the per-run execution context,
//! the node contract and registry, and the wave-based executor. This crate
//! performs no network IO; concrete node units live in `dagflow-infra`.

pub mod workflow;

pub use workflow::context::ExecutionContext;
pub use workflow::executor::{EngineError, WorkflowEngine};
pub use workflow::node::{Node, NodeError, NodeFuture};
pub use workflow::registry::{NodeRegistry, RegistryError};
