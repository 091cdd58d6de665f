//! `webhook_alert`: POSTs an alert to a webhook URL.
//!
//! Payload: `{ workflow, run_id, message, severity, ...extra }`. Any non-2xx
//! response fails the node.

use dagflow_core::workflow::node::{optional_str, require_str};
use dagflow_core::{ExecutionContext, Node, NodeError, NodeFuture};
use serde_json::{Map, Value, json};

use super::egress::EgressPolicy;
use super::http::response_to_value;

const SEVERITIES: &[&str] = &["info", "warning", "error", "critical"];

pub struct WebhookAlertNode {
    client: reqwest::Client,
    egress: EgressPolicy,
}

impl WebhookAlertNode {
    pub fn new(client: reqwest::Client, egress: EgressPolicy) -> Self {
        Self { client, egress }
    }
}

impl Node for WebhookAlertNode {
    fn execute<'a>(&'a self, config: Value, ctx: &'a ExecutionContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let raw_url = require_str(&config, "url")?;
            let message = require_str(&config, "message")?;
            let severity = optional_str(&config, "severity")?.unwrap_or("info");
            if !SEVERITIES.contains(&severity) {
                return Err(NodeError::invalid_config(format!(
                    "severity must be one of {}",
                    SEVERITIES.join(", ")
                )));
            }

            let mut payload = Map::new();
            if let Some(extra) = config.get("extra") {
                let extra = extra
                    .as_object()
                    .ok_or_else(|| NodeError::invalid_config("'extra' must be a mapping"))?;
                payload.extend(extra.clone());
            }
            payload.insert("workflow".to_string(), json!(ctx.workflow_name()));
            payload.insert("run_id".to_string(), json!(ctx.run_id()));
            payload.insert("message".to_string(), json!(message));
            payload.insert("severity".to_string(), json!(severity));

            let url = self.egress.check_url(raw_url).await?;
            let response = self
                .client
                .post(url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| NodeError::failed(format!("webhook '{raw_url}' failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response_to_value(response).await?;
                return Err(NodeError::failed(format!(
                    "webhook '{raw_url}' returned {}: {}",
                    status.as_u16(),
                    detail["body"]
                )));
            }

            tracing::info!(
                run_id = ctx.run_id(),
                severity,
                status = status.as_u16(),
                "alert delivered"
            );
            Ok(json!({ "status": status.as_u16(), "delivered": true }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::http::tests::serve;

    fn node() -> WebhookAlertNode {
        WebhookAlertNode::new(reqwest::Client::new(), EgressPolicy::new(true))
    }

    #[tokio::test]
    async fn test_delivers_payload() {
        let (addr, captured) = serve(200, "{}").await;
        let ctx = ExecutionContext::new("nightly", Some("run-9".to_string()));
        let out = node()
            .execute(
                json!({
                    "url": format!("http://{addr}/hook"),
                    "message": "disk full",
                    "severity": "critical",
                    "extra": {"host": "db1"}
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"status": 200, "delivered": true}));

        let request = captured.lock().unwrap().clone();
        let body_start = request.find("\r\n\r\n").unwrap() + 4;
        let body: Value = serde_json::from_str(&request[body_start..]).unwrap();
        assert_eq!(
            body,
            json!({
                "host": "db1",
                "workflow": "nightly",
                "run_id": "run-9",
                "message": "disk full",
                "severity": "critical"
            })
        );
    }

    #[tokio::test]
    async fn test_non_success_fails() {
        let (addr, _) = serve(500, r#"{"error": "nope"}"#).await;
        let ctx = ExecutionContext::new("wf", None);
        let err = node()
            .execute(json!({"url": format!("http://{addr}/"), "message": "m"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("returned 500"));
    }

    #[tokio::test]
    async fn test_rejects_unknown_severity() {
        let ctx = ExecutionContext::new("wf", None);
        let err = node()
            .execute(
                json!({"url": "http://127.0.0.1/", "message": "m", "severity": "meh"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }
}
