use thiserror::Error;

/// Errors in the shape of a workflow definition.
///
/// All of these are raised before any node executes.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("duplicate node id: '{0}'")]
    DuplicateNodeId(String),

    #[error("node '{node}' depends on unknown node '{dependency}'")]
    MissingDependency { node: String, dependency: String },

    #[error("cycle detected involving node '{node}'")]
    Cycle { node: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
