//! Engine configuration types.
//!
//! `EngineConfig` represents `config.toml` in the data directory. Every field
//! has a default so a missing or partial file is always usable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the engine and the bundled node units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on node units executing at once within a wave.
    /// `None` runs every ready node concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Let network node units reach loopback/private/link-local addresses.
    #[serde(default)]
    pub allow_private_network: bool,

    /// Request timeout for network node units.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Root directory for the `file_store` node. Defaults to `<data_dir>/storage`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            allow_private_network: false,
            http_timeout_secs: default_http_timeout_secs(),
            storage_dir: None,
            log_format: LogFormat::default(),
        }
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, None);
        assert!(!config.allow_private_network);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
max_concurrency = 4
log_format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.http_timeout_secs, 30);
        assert!(config.storage_dir.is_none());
    }
}
