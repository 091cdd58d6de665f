//! Application state shared by CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use dagflow_core::{NodeRegistry, WorkflowEngine};
use dagflow_infra::builtin_registry;
use dagflow_types::config::EngineConfig;

pub struct AppState {
    pub data_dir: PathBuf,
    pub engine: WorkflowEngine,
}

impl AppState {
    /// Build the bundled node registry and an engine around it.
    pub fn init(data_dir: PathBuf, config: EngineConfig) -> anyhow::Result<Self> {
        let registry: NodeRegistry = builtin_registry(&config, &data_dir)?;
        let engine = WorkflowEngine::new(Arc::new(registry), &config);
        Ok(Self {
            data_dir,
            engine,
        })
    }

    pub fn registry(&self) -> &NodeRegistry {
        self.engine.registry()
    }
}
