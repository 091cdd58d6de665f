//! Per-run execution context: node results and node errors.
//!
//! `ExecutionContext` is scoped to a single run. The engine is the only
//! writer; templates and guards read from it. Cloning shares the underlying
//! maps, while [`ExecutionContext::snapshot`] produces an independent copy
//! (the frozen view handed to a wave's tasks).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value, json};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ContextError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no result recorded for node '{0}'")]
    MissingResult(String),

    #[error("no error recorded for node '{0}'")]
    MissingError(String),
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Terminal state of a node as seen from the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Ok,
    Error(String),
    Skipped,
}

impl NodeStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, NodeStatus::Error(_))
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Ok => write!(f, "ok"),
            NodeStatus::Error(message) => write!(f, "error: {message}"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

struct Inner {
    workflow_name: String,
    run_id: String,
    started_at: DateTime<Utc>,
    results: DashMap<String, Value>,
    errors: DashMap<String, String>,
}

/// Results and errors for one workflow run, keyed by node id.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workflow_name", &self.inner.workflow_name)
            .field("run_id", &self.inner.run_id)
            .field("results", &self.inner.results.len())
            .field("errors", &self.inner.errors.len())
            .finish()
    }
}

impl ExecutionContext {
    /// Create an empty context. A UUIDv7 run id is generated when none is given.
    pub fn new(workflow_name: impl Into<String>, run_id: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                workflow_name: workflow_name.into(),
                run_id: run_id.unwrap_or_else(|| Uuid::now_v7().to_string()),
                started_at: Utc::now(),
                results: DashMap::new(),
                errors: DashMap::new(),
            }),
        }
    }

    pub fn workflow_name(&self) -> &str {
        &self.inner.workflow_name
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn set_result(&self, node_id: impl Into<String>, value: Value) {
        self.inner.results.insert(node_id.into(), value);
    }

    pub fn get_result(&self, node_id: &str) -> Result<Value, ContextError> {
        self.inner
            .results
            .get(node_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ContextError::MissingResult(node_id.to_string()))
    }

    pub fn has_result(&self, node_id: &str) -> bool {
        self.inner.results.contains_key(node_id)
    }

    /// Copy of every stored result.
    pub fn all_results(&self) -> Map<String, Value> {
        self.inner
            .results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn set_error(&self, node_id: impl Into<String>, message: impl Into<String>) {
        self.inner.errors.insert(node_id.into(), message.into());
    }

    pub fn get_error(&self, node_id: &str) -> Result<String, ContextError> {
        self.inner
            .errors
            .get(node_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ContextError::MissingError(node_id.to_string()))
    }

    pub fn has_error(&self, node_id: &str) -> bool {
        self.inner.errors.contains_key(node_id)
    }

    /// Remove a recorded error, e.g. after a retry succeeds.
    pub fn clear_error(&self, node_id: &str) -> Option<String> {
        self.inner.errors.remove(node_id).map(|(_, message)| message)
    }

    /// Copy of every stored error message.
    pub fn all_errors(&self) -> Map<String, Value> {
        self.inner
            .errors
            .iter()
            .map(|entry| (entry.key().clone(), Value::String(entry.value().clone())))
            .collect()
    }

    /// Independent deep copy with the same run identity.
    pub fn snapshot(&self) -> Self {
        let copy = |src: &Inner| Inner {
            workflow_name: src.workflow_name.clone(),
            run_id: src.run_id.clone(),
            started_at: src.started_at,
            results: src.results.clone(),
            errors: src.errors.clone(),
        };
        Self {
            inner: Arc::new(copy(&self.inner)),
        }
    }

    pub fn node_status(&self, node_id: &str) -> NodeStatus {
        if let Some(message) = self.inner.errors.get(node_id) {
            return NodeStatus::Error(message.value().clone());
        }
        if self.has_result(node_id) {
            NodeStatus::Ok
        } else {
            NodeStatus::Skipped
        }
    }

    /// Per-node status in the order given.
    pub fn summarize<'a, I>(&self, node_ids: I) -> Vec<(String, NodeStatus)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        node_ids
            .into_iter()
            .map(|id| (id.to_string(), self.node_status(id)))
            .collect()
    }

    /// Serialize the context for reporting.
    pub fn to_json(&self) -> Value {
        json!({
            "workflow_name": self.workflow_name(),
            "run_id": self.run_id(),
            "started_at": self.started_at().to_rfc3339(),
            "results": self.all_results(),
            "errors": self.all_errors(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
