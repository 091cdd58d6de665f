//! Bundled node units.
//!
//! | type            | purpose                                      |
//! |-----------------|----------------------------------------------|
//! | `transform`     | pass a (templated) value through             |
//! | `log`           | emit a tracing event                         |
//! | `delay`         | sleep for a number of seconds                |
//! | `http`          | outbound HTTP request                        |
//! | `webhook_alert` | POST an alert payload to a webhook           |
//! | `file_store`    | read/write files under the storage directory |

pub mod delay;
pub mod egress;
pub mod file_store;
pub mod http;
pub mod log;
pub mod transform;
pub mod webhook_alert;

use std::path::Path;
use std::time::Duration;

use dagflow_core::{Node, NodeRegistry, RegistryError};
use dagflow_types::config::EngineConfig;

use crate::config::resolve_storage_dir;

use self::delay::DelayNode;
use self::egress::EgressPolicy;
use self::file_store::FileStoreNode;
use self::http::HttpNode;
use self::log::LogNode;
use self::transform::TransformNode;
use self::webhook_alert::WebhookAlertNode;

#[derive(Debug, thiserror::Error)]
pub enum BuiltinError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Registry with every bundled node type.
///
/// Network units share one `reqwest::Client` that enforces the egress policy
/// from `config` on redirects and DNS; `file_store` is rooted at the resolved
/// storage directory.
pub fn builtin_registry(config: &EngineConfig, data_dir: &Path) -> Result<NodeRegistry, BuiltinError> {
    let egress = EgressPolicy::new(config.allow_private_network);
    let client = egress
        .apply(reqwest::Client::builder())
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(concat!("dagflow/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let storage_dir = resolve_storage_dir(config, data_dir);

    let mut registry = NodeRegistry::new();
    registry.register_node::<TransformNode>("transform")?;
    registry.register_node::<LogNode>("log")?;
    registry.register_node::<DelayNode>("delay")?;

    let http_client = client.clone();
    registry.register("http", move || {
        Box::new(HttpNode::new(http_client.clone(), egress)) as Box<dyn Node>
    })?;

    registry.register("webhook_alert", move || {
        Box::new(WebhookAlertNode::new(client.clone(), egress)) as Box<dyn Node>
    })?;

    registry.register("file_store", move || {
        Box::new(FileStoreNode::new(storage_dir.clone())) as Box<dyn Node>
    })?;

    tracing::debug!(types = ?registry.list_types(), "built-in node registry ready");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_registry_types() {
        let tmp = TempDir::new().unwrap();
        let registry = builtin_registry(&EngineConfig::default(), tmp.path()).unwrap();
        assert_eq!(
            registry.list_types(),
            vec!["delay", "file_store", "http", "log", "transform", "webhook_alert"]
        );
    }
}
