//! Node type registry.
//!
//! Maps a node type name to a factory that builds a fresh unit. Constructed
//! explicitly and handed to the engine as `Arc<NodeRegistry>`; there is no
//! process-wide registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::node::Node;

/// Builds a fresh node unit.
pub type NodeFactory = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("node type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("unknown node type '{0}'")]
    NotFound(String),
}

/// Registry of node factories, indexed by type name.
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under `type_name`. Names are never replaced.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(RegistryError::AlreadyRegistered(type_name));
        }
        tracing::debug!(node_type = type_name.as_str(), "registered node type");
        self.factories.insert(type_name, Arc::new(factory));
        Ok(())
    }

    /// Register a `Default`-constructible node type.
    pub fn register_node<N>(&mut self, type_name: impl Into<String>) -> Result<(), RegistryError>
    where
        N: Node + Default + 'static,
    {
        self.register(type_name, || Box::new(N::default()) as Box<dyn Node>)
    }

    /// Look up the factory for `type_name`.
    pub fn get(&self, type_name: &str) -> Result<NodeFactory, RegistryError> {
        self.factories
            .get(type_name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))
    }

    /// Build a fresh unit of `type_name`.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn Node>, RegistryError> {
        self.get(type_name).map(|factory| factory())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn list_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.list_types())
            .finish()
    }
}
