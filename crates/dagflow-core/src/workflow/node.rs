//! The node contract: resolved config in, JSON result out.
//!
//! The engine knows nothing about what a node does. Units are created fresh
//! for every attempt by the [`NodeRegistry`](super::registry::NodeRegistry)
//! and receive the template-resolved config plus a read-only view of the
//! run's context.

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use super::context::ExecutionContext;
use super::registry::RegistryError;
use super::template::TemplateError;

/// Boxed future returned by [`Node::execute`].
pub type NodeFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, NodeError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// Failure of a single node attempt. Recorded as the node's error message
/// and handled according to its `on_error` policy.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("node panicked: {0}")]
    Panicked(String),
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        NodeError::InvalidConfig(message.into())
    }
}

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// An executable workflow step.
///
/// Uses a boxed future so the registry can hold `Box<dyn Node>`.
pub trait Node: Send + Sync {
    fn execute<'a>(&'a self, config: Value, ctx: &'a ExecutionContext) -> NodeFuture<'a>;
}

// ---------------------------------------------------------------------------
// Config accessors
// ---------------------------------------------------------------------------

/// Borrow the resolved config as a mapping.
pub fn config_map(config: &Value) -> Result<&Map<String, Value>, NodeError> {
    config
        .as_object()
        .ok_or_else(|| NodeError::invalid_config("config must be a mapping"))
}

/// Required string field.
pub fn require_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, NodeError> {
    match config.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(NodeError::invalid_config(format!(
            "'{key}' must be a string, got {other}"
        ))),
        None => Err(NodeError::invalid_config(format!("missing required field '{key}'"))),
    }
}

/// Optional string field; `null` counts as absent.
pub fn optional_str<'a>(config: &'a Value, key: &str) -> Result<Option<&'a str>, NodeError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(NodeError::invalid_config(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}
