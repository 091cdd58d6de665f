//! Workflow domain types for dagflow.
//!
//! `WorkflowDefinition` is the canonical, immutable description of a node
//! graph. It is built from YAML/JSON documents or programmatically, and the
//! unique-node-id invariant is checked on every construction path (including
//! deserialization).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DefinitionError;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A validated workflow: name, trigger, and an ordered list of nodes.
///
/// Fields are private so the unique-id invariant cannot be broken after
/// construction. Use [`WorkflowDefinition::new`] or deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflowDefinition")]
pub struct WorkflowDefinition {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    trigger: TriggerSpec,
    nodes: Vec<NodeDefinition>,
}

/// Unvalidated document shape, converted through `TryFrom`.
#[derive(Deserialize)]
struct RawWorkflowDefinition {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    trigger: TriggerSpec,
    #[serde(default)]
    nodes: Vec<NodeDefinition>,
}

impl TryFrom<RawWorkflowDefinition> for WorkflowDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawWorkflowDefinition) -> Result<Self, Self::Error> {
        WorkflowDefinition::new(raw.name, raw.description, raw.trigger, raw.nodes)
    }
}

impl WorkflowDefinition {
    /// Build a workflow, rejecting duplicate node ids.
    ///
    /// Dependency existence and acyclicity are graph properties checked by
    /// the engine before a run, not here.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        trigger: TriggerSpec,
        nodes: Vec<NodeDefinition>,
    ) -> Result<Self, DefinitionError> {
        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(DefinitionError::DuplicateNodeId(node.id.clone()));
            }
        }

        Ok(Self {
            name: name.into(),
            description,
            trigger,
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[NodeDefinition] {
        &self.nodes
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started. Consumed by trigger collaborators only; the
/// engine never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(rename = "type", default = "default_trigger_type")]
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

fn default_trigger_type() -> String {
    "manual".to_string()
}

impl Default for TriggerSpec {
    fn default() -> Self {
        Self {
            trigger_type: default_trigger_type(),
            config: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node Definition
// ---------------------------------------------------------------------------

/// A single node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique within a workflow; also the key of this node's result.
    pub id: String,
    /// Registered node kind (e.g. "http", "transform").
    #[serde(rename = "type")]
    pub node_type: String,
    /// Node configuration; may contain `{{ ... }}` templates.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    /// Node ids that must be terminal before this node may run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Optional guard expression; the node is skipped when it is falsy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default)]
    pub on_error: OnError,
    /// Only consulted when `on_error` is `retry`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Map::new(),
            depends_on: Vec::new(),
            when: None,
            on_error: OnError::default(),
            retry: None,
        }
    }

    /// Replace the config. Non-object values are ignored.
    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config = map;
        }
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn when(mut self, expression: impl Into<String>) -> Self {
        self.when = Some(expression.into());
        self
    }

    pub fn on_error(mut self, policy: OnError) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// The effective retry policy (defaults when none was given).
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default()
    }
}

/// What to do when a node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Record the error and keep going; dependents still run.
    Skip,
    /// Record the error and halt the run once the current wave drains.
    #[default]
    Stop,
    /// Re-execute with exponential back-off, then behave like `Stop`.
    Retry,
}

impl std::fmt::Display for OnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OnError::Skip => "skip",
            OnError::Stop => "stop",
            OnError::Retry => "retry",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Retry Policy
// ---------------------------------------------------------------------------

/// Retry configuration for a node with `on_error: retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure (default 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base back-off in seconds (default 1). Attempt `n` waits `delay * 2^(n-1)`.
    #[serde(default = "default_delay")]
    pub delay: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay: default_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
