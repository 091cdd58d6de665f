//! `log`: emits `message` as a tracing event at `level` (info, warn, debug).

use dagflow_core::workflow::node::{optional_str, require_str};
use dagflow_core::{ExecutionContext, Node, NodeError, NodeFuture};
use serde_json::{Value, json};

#[derive(Debug, Default)]
pub struct LogNode;

impl Node for LogNode {
    fn execute<'a>(&'a self, config: Value, ctx: &'a ExecutionContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let message = require_str(&config, "message")?;
            let run_id = ctx.run_id();
            let workflow = ctx.workflow_name();

            match optional_str(&config, "level")?.unwrap_or("info") {
                "info" => tracing::info!(run_id, workflow, "{message}"),
                "warn" => tracing::warn!(run_id, workflow, "{message}"),
                "debug" => tracing::debug!(run_id, workflow, "{message}"),
                other => {
                    return Err(NodeError::invalid_config(format!(
                        "unknown log level '{other}'"
                    )));
                }
            }
            Ok(json!({ "logged": message }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logs_message() {
        let ctx = ExecutionContext::new("wf", None);
        let out = LogNode
            .execute(json!({"message": "hello", "level": "warn"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"logged": "hello"}));
    }

    #[tokio::test]
    async fn test_rejects_unknown_level_and_missing_message() {
        let ctx = ExecutionContext::new("wf", None);
        assert!(matches!(
            LogNode.execute(json!({"message": "x", "level": "loud"}), &ctx).await,
            Err(NodeError::InvalidConfig(_))
        ));
        assert!(LogNode.execute(json!({}), &ctx).await.is_err());
    }
}
