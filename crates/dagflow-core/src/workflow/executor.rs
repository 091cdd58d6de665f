//! Workflow executor: dynamic wave scheduling over the node graph.
//!
//! `WorkflowEngine::run` validates the graph, seeds the context, then loops:
//! every node whose dependencies are all terminal is launched on a
//! `tokio::task::JoinSet`, the wave is drained, and the next ready set is
//! computed. A node that fails under `on_error: stop` (or exhausts its
//! retries) halts scheduling once its wave drains.
//!
//! # Per-node flow
//!
//! 1. Evaluate the `when` guard against the wave snapshot. False or error: skip.
//! 2. Resolve templates in `config`.
//! 3. Build a fresh unit from the registry and execute it on its own task so a
//!    panic is contained to that node.
//! 4. Record the result, or the error and apply `on_error`.

use std::collections::HashSet;
use std::sync::Arc;

use dagflow_types::config::EngineConfig;
use dagflow_types::error::DefinitionError;
use dagflow_types::workflow::{NodeDefinition, OnError, WorkflowDefinition};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use super::context::ExecutionContext;
use super::dag::validate_graph;
use super::expression::{ExpressionError, SafeEvaluator};
use super::node::NodeError;
use super::registry::NodeRegistry;
use super::retry::RetryHandler;
use super::template;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Run-level failure. Only raised before any node executes; node failures
/// are recorded in the returned context instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("initial context key '{0}' collides with a node id")]
    ContextKeyCollision(String),
}

// ---------------------------------------------------------------------------
// Guard evaluator
// ---------------------------------------------------------------------------

/// Evaluator used for `when` guards, with `has_result(id)` and
/// `has_error(id)` answering from `ctx`.
pub fn guard_evaluator(ctx: &ExecutionContext) -> SafeEvaluator {
    let results = ctx.clone();
    let errors = ctx.clone();
    SafeEvaluator::new()
        .with_function("has_result", move |args| {
            node_id_arg("has_result", args).map(|id| Value::Bool(results.has_result(id)))
        })
        .with_function("has_error", move |args| {
            node_id_arg("has_error", args).map(|id| Value::Bool(errors.has_error(id)))
        })
}

fn node_id_arg<'a>(function: &str, args: &'a [Value]) -> Result<&'a str, ExpressionError> {
    match args {
        [Value::String(id)] => Ok(id),
        _ => Err(ExpressionError::Type(format!(
            "{function}() takes exactly one string argument"
        ))),
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Executes workflow definitions against a node registry.
///
/// Holds no per-run state, so one engine can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    /// Bounds node units executing at once; `None` is unbounded.
    max_concurrency: Option<usize>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<NodeRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            max_concurrency: config.max_concurrency.filter(|n| *n > 0),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Run `workflow` to completion.
    ///
    /// `initial_context` entries are stored as results before the first wave
    /// so guards and templates can reference them by key. A key may not equal
    /// a node id. Fails only on a definition error or such a collision, in
    /// which case nothing executes.
    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        run_id: Option<String>,
        initial_context: Option<Map<String, Value>>,
    ) -> Result<ExecutionContext, EngineError> {
        validate_graph(workflow.nodes())?;

        let initial_context = initial_context.unwrap_or_default();
        if let Some(key) = initial_context.keys().find(|key| workflow.node(key).is_some()) {
            return Err(EngineError::ContextKeyCollision(key.clone()));
        }

        let ctx = ExecutionContext::new(workflow.name(), run_id);
        for (key, value) in initial_context {
            ctx.set_result(key, value);
        }

        tracing::info!(
            run_id = ctx.run_id(),
            workflow = workflow.name(),
            nodes = workflow.nodes().len(),
            "starting workflow run"
        );

        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let mut completed: HashSet<String> = HashSet::new();
        let mut wave = 0usize;

        loop {
            let ready: Vec<&NodeDefinition> = workflow
                .nodes()
                .iter()
                .filter(|node| {
                    !completed.contains(&node.id)
                        && node.depends_on.iter().all(|dep| completed.contains(dep))
                })
                .collect();
            if ready.is_empty() {
                break;
            }

            tracing::debug!(
                run_id = ctx.run_id(),
                wave,
                nodes = ready.len(),
                "processing wave"
            );

            let snapshot = ctx.snapshot();
            let mut join_set = JoinSet::new();
            for node in &ready {
                let job = NodeJob {
                    node: (*node).clone(),
                    registry: Arc::clone(&self.registry),
                    ctx: ctx.clone(),
                    snapshot: snapshot.clone(),
                    semaphore: semaphore.clone(),
                };
                join_set.spawn(job.run());
            }

            let mut stop = false;
            let mut reported: HashSet<String> = HashSet::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((node_id, outcome)) => {
                        stop |= outcome == NodeOutcome::Halt;
                        reported.insert(node_id);
                    }
                    Err(e) => {
                        tracing::error!(run_id = ctx.run_id(), wave, error = %e, "node task failed");
                    }
                }
            }

            for node in ready {
                if !reported.contains(&node.id) {
                    ctx.set_error(node.id.as_str(), "node task aborted");
                    stop = true;
                }
                completed.insert(node.id.clone());
            }

            if stop {
                tracing::info!(run_id = ctx.run_id(), wave, "halting run after failed node");
                break;
            }
            wave += 1;
        }

        tracing::info!(
            run_id = ctx.run_id(),
            workflow = workflow.name(),
            waves = wave + 1,
            completed = completed.len(),
            errors = ctx.all_errors().len(),
            "workflow run finished"
        );

        Ok(ctx)
    }
}

// ---------------------------------------------------------------------------
// Per-node execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOutcome {
    Succeeded,
    Skipped,
    /// Failed, run continues.
    Failed,
    /// Failed, run halts after this wave.
    Halt,
}

/// Everything one node task owns.
struct NodeJob {
    node: NodeDefinition,
    registry: Arc<NodeRegistry>,
    /// Live context; the task writes only its own node id.
    ctx: ExecutionContext,
    /// Frozen view of results from earlier waves.
    snapshot: ExecutionContext,
    semaphore: Option<Arc<Semaphore>>,
}

impl NodeJob {
    async fn run(self) -> (String, NodeOutcome) {
        let outcome = self.execute().await;
        (self.node.id, outcome)
    }

    async fn execute(&self) -> NodeOutcome {
        let node_id = self.node.id.as_str();
        let run_id = self.ctx.run_id();

        if let Some(guard) = &self.node.when {
            let evaluator = guard_evaluator(&self.snapshot);
            match evaluator.evaluate_bool(guard, &self.snapshot.all_results()) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(run_id, node_id, "guard false, skipping node");
                    return NodeOutcome::Skipped;
                }
                Err(e) => {
                    tracing::debug!(run_id, node_id, error = %e, "guard failed, skipping node");
                    return NodeOutcome::Skipped;
                }
            }
        }

        let policy = self.node.retry_policy();
        let retries = self.node.on_error == OnError::Retry;

        let mut attempt = 1u32;
        loop {
            match self.attempt().await {
                Ok(value) => {
                    self.ctx.set_result(node_id, value);
                    self.ctx.clear_error(node_id);
                    tracing::debug!(run_id, node_id, attempt, "node succeeded");
                    return NodeOutcome::Succeeded;
                }
                Err(e) => {
                    let message = e.to_string();
                    self.ctx.set_error(node_id, message.as_str());

                    if retries && RetryHandler::should_retry(&policy, attempt) {
                        let delay = RetryHandler::backoff_delay(&policy, attempt);
                        tracing::warn!(
                            run_id,
                            node_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = message.as_str(),
                            "node failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::warn!(
                        run_id,
                        node_id,
                        attempt,
                        on_error = %self.node.on_error,
                        error = message.as_str(),
                        "node failed"
                    );
                    return match self.node.on_error {
                        OnError::Skip => NodeOutcome::Failed,
                        OnError::Stop | OnError::Retry => NodeOutcome::Halt,
                    };
                }
            }
        }
    }

    /// One attempt: resolve config, build a unit, execute it.
    async fn attempt(&self) -> Result<Value, NodeError> {
        let config = template::resolve(&Value::Object(self.node.config.clone()), &self.snapshot)?;
        let unit = self.registry.create(&self.node.node_type)?;

        let _permit = match &self.semaphore {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| NodeError::failed(e.to_string()))?,
            ),
            None => None,
        };

        let ctx = self.snapshot.clone();
        let handle = tokio::spawn(async move { unit.execute(config, &ctx).await });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let message = panic_message(e);
                tracing::error!(
                    run_id = self.ctx.run_id(),
                    node_id = self.node.id.as_str(),
                    error = message.as_str(),
                    "node unit panicked"
                );
                Err(NodeError::Panicked(message))
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
