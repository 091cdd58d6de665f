//! `delay`: sleeps for `seconds` (fractional allowed).

use std::time::Duration;

use dagflow_core::{ExecutionContext, Node, NodeError, NodeFuture};
use serde_json::{Value, json};

/// Longest sleep a single node may request.
const MAX_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Default)]
pub struct DelayNode;

impl Node for DelayNode {
    fn execute<'a>(&'a self, config: Value, _ctx: &'a ExecutionContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let seconds = config
                .get("seconds")
                .and_then(Value::as_f64)
                .ok_or_else(|| NodeError::invalid_config("'seconds' must be a number"))?;
            if !(0.0..=MAX_DELAY_SECS).contains(&seconds) {
                return Err(NodeError::invalid_config(format!(
                    "'seconds' must be between 0 and {MAX_DELAY_SECS}"
                )));
            }

            let duration = Duration::from_secs_f64(seconds);
            tokio::time::sleep(duration).await;
            Ok(json!({ "slept_ms": duration.as_millis() as u64 }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_for_requested_time() {
        let ctx = ExecutionContext::new("wf", None);
        let started = tokio::time::Instant::now();
        let out = DelayNode.execute(json!({"seconds": 1.5}), &ctx).await.unwrap();
        assert_eq!(out, json!({"slept_ms": 1500}));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_rejects_bad_seconds() {
        let ctx = ExecutionContext::new("wf", None);
        assert!(DelayNode.execute(json!({"seconds": "soon"}), &ctx).await.is_err());
        assert!(DelayNode.execute(json!({"seconds": -1}), &ctx).await.is_err());
        assert!(DelayNode.execute(json!({}), &ctx).await.is_err());
    }
}
