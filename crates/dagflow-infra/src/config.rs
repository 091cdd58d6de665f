//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.dagflow/` by default) and
//! deserializes it into [`EngineConfig`]. Falls back to defaults when the file
//! is missing or malformed.

use std::path::{Path, PathBuf};

use dagflow_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DAGFLOW_DATA_DIR";

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparseable file: logs a warning, returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `DAGFLOW_DATA_DIR` environment variable
/// 2. `~/.dagflow`
/// 3. `./.dagflow` when no home directory is known
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".dagflow");
    }

    PathBuf::from(".dagflow")
}

/// Root directory for the `file_store` node.
pub fn resolve_storage_dir(config: &EngineConfig, data_dir: &Path) -> PathBuf {
    config
        .storage_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("storage"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_types::config::LogFormat;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
max_concurrency = 8
allow_private_network = true
http_timeout_secs = 5
storage_dir = "/srv/dagflow"
log_format = "json"
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.max_concurrency, Some(8));
        assert!(config.allow_private_network);
        assert_eq!(config.http_timeout_secs, 5);
        assert_eq!(config.storage_dir, Some(PathBuf::from("/srv/dagflow")));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "max_concurrency = [oops")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn storage_dir_defaults_under_data_dir() {
        let data_dir = PathBuf::from("/home/user/.dagflow");
        let mut config = EngineConfig::default();
        assert_eq!(
            resolve_storage_dir(&config, &data_dir),
            PathBuf::from("/home/user/.dagflow/storage")
        );

        config.storage_dir = Some(PathBuf::from("/mnt/files"));
        assert_eq!(resolve_storage_dir(&config, &data_dir), PathBuf::from("/mnt/files"));
    }

    #[test]
    fn resolve_data_dir_from_env() {
        // SAFETY: no other test in this crate reads or writes this variable.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-dagflow");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-dagflow"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
