//! `transform`: returns its resolved `value`, or the whole config when no
//! `value` key is present. Reshaping happens in templates.

use dagflow_core::{ExecutionContext, Node, NodeFuture};
use dagflow_core::workflow::node::config_map;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct TransformNode;

impl Node for TransformNode {
    fn execute<'a>(&'a self, config: Value, _ctx: &'a ExecutionContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let map = config_map(&config)?;
            Ok(match map.get("value") {
                Some(value) => value.clone(),
                None => config,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_returns_value_verbatim() {
        let ctx = ExecutionContext::new("wf", None);
        let out = TransformNode
            .execute(json!({"value": [1, {"a": 2}]}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!([1, {"a": 2}]));
    }

    #[tokio::test]
    async fn test_without_value_returns_config() {
        let ctx = ExecutionContext::new("wf", None);
        let out = TransformNode.execute(json!({"a": 1, "b": "x"}), &ctx).await.unwrap();
        assert_eq!(out, json!({"a": 1, "b": "x"}));
    }
}
