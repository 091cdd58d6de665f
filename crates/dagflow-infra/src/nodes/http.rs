//! `http`: outbound HTTP request.
//!
//! Config: `url` (required), `method` (GET), `headers` (mapping), `body`
//! (string sent verbatim, anything else sent as JSON), `fail_on_status`
//! (true: a 4xx/5xx response fails the node).
//!
//! Result: `{ status, headers, body }`; the body is parsed as JSON when it
//! parses, otherwise kept as text.

use std::collections::BTreeMap;

use dagflow_core::workflow::expression::render;
use dagflow_core::workflow::node::{config_map, optional_str, require_str};
use dagflow_core::{ExecutionContext, Node, NodeError, NodeFuture};
use serde_json::{Value, json};

use super::egress::EgressPolicy;

pub struct HttpNode {
    client: reqwest::Client,
    egress: EgressPolicy,
}

impl HttpNode {
    pub fn new(client: reqwest::Client, egress: EgressPolicy) -> Self {
        Self { client, egress }
    }
}

impl Node for HttpNode {
    fn execute<'a>(&'a self, config: Value, ctx: &'a ExecutionContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let raw_url = require_str(&config, "url")?;
            let method = optional_str(&config, "method")?.unwrap_or("GET");
            let http_method: reqwest::Method = method
                .to_ascii_uppercase()
                .parse()
                .map_err(|_| NodeError::invalid_config(format!("invalid HTTP method: {method}")))?;
            let fail_on_status = config
                .get("fail_on_status")
                .and_then(Value::as_bool)
                .unwrap_or(true);

            let url = self.egress.check_url(raw_url).await?;
            let mut request = self.client.request(http_method, url);

            if let Some(headers) = config_map(&config)?.get("headers") {
                let headers = headers
                    .as_object()
                    .ok_or_else(|| NodeError::invalid_config("'headers' must be a mapping"))?;
                for (key, value) in headers {
                    request = request.header(key.as_str(), render(value));
                }
            }

            request = match config.get("body") {
                None | Some(Value::Null) => request,
                Some(Value::String(text)) => request.body(text.clone()),
                Some(other) => request.json(other),
            };

            let response = request.send().await.map_err(|e| {
                NodeError::failed(format!("HTTP request to '{raw_url}' failed: {e}"))
            })?;
            let result = response_to_value(response).await?;
            let status = result["status"].as_u64().unwrap_or_default();

            tracing::info!(
                run_id = ctx.run_id(),
                url = raw_url,
                status,
                "HTTP node completed"
            );

            if fail_on_status && status >= 400 {
                return Err(NodeError::failed(format!(
                    "HTTP {status} from '{raw_url}'"
                )));
            }
            Ok(result)
        })
    }
}

/// Convert a response into `{ status, headers, body }`.
pub(crate) async fn response_to_value(response: reqwest::Response) -> Result<Value, NodeError> {
    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect();
    let text = response
        .text()
        .await
        .map_err(|e| NodeError::failed(format!("failed to read HTTP response body: {e}")))?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    Ok(json!({
        "status": status,
        "headers": headers,
        "body": body,
    }))
}
