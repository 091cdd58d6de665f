//! Workflow definition parsing, validation, and file loading.
//!
//! Converts YAML or JSON documents into a `WorkflowDefinition` and runs the
//! graph checks the engine would run, so a bad file is rejected before any
//! node is executed.

use std::path::Path;

use dagflow_types::error::DefinitionError;
use dagflow_types::workflow::WorkflowDefinition;

use super::context::ExecutionContext;
use super::dag::validate_graph;
use super::executor::guard_evaluator;
use super::expression::ExpressionError;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML document into a graph-validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_graph(def.nodes())?;
    Ok(def)
}

/// Parse a JSON document into a graph-validated `WorkflowDefinition`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let def: WorkflowDefinition =
        serde_json::from_str(json).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_graph(def.nodes())?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to YAML.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Guard checks
// ---------------------------------------------------------------------------

/// Parse every `when` guard without evaluating it.
///
/// Returns `(node_id, error)` for each guard that is malformed or uses
/// syntax outside the sandbox. At run time such a guard skips its node, so
/// this is the only place the mistake becomes visible.
pub fn guard_errors(def: &WorkflowDefinition) -> Vec<(String, ExpressionError)> {
    let evaluator = guard_evaluator(&ExecutionContext::new(def.name(), None));
    def.nodes()
        .iter()
        .filter_map(|node| {
            let expression = node.when.as_deref()?;
            evaluator
                .check(expression)
                .err()
                .map(|e| (node.id.clone(), e))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow file. `.json` files are read as JSON, anything else as YAML.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow_yaml(&content)
    }
}

/// Save a workflow definition as YAML, creating parent directories.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_types::workflow::{NodeDefinition, OnError, TriggerSpec};
    use serde_json::json;

    const PIPELINE: &str = r#"
name: pipeline
nodes:
  - id: fetch
    type: http
    config:
      url: https://example.com
    on_error: retry
    retry:
      max_retries: 2
      delay: 0.25
  - id: parse
    type: transform
    depends_on: [fetch]
    when: "fetch.status == 200"
    config:
      value: "{{ fetch }}"
"#;

    #[test]
    fn test_parse_yaml() {
        let def = parse_workflow_yaml(PIPELINE).unwrap();
        assert_eq!(def.name(), "pipeline");
        assert_eq!(def.nodes().len(), 2);
        let fetch = def.node("fetch").unwrap();
        assert_eq!(fetch.on_error, OnError::Retry);
        assert_eq!(fetch.retry_policy().max_retries, 2);
        assert_eq!(def.node("parse").unwrap().depends_on, vec!["fetch"]);
    }

    #[test]
    fn test_parse_json() {
        let doc = json!({
            "name": "j",
            "nodes": [
                {"id": "a", "type": "transform", "config": {"value": 1}},
                {"id": "b", "type": "log", "depends_on": ["a"], "on_error": "skip"}
            ]
        });
        let def = parse_workflow_json(&doc.to_string()).unwrap();
        assert_eq!(def.node("b").unwrap().on_error, OnError::Skip);
    }

    #[test]
    fn test_parse_rejects_duplicate_ids() {
        let yaml = r#"
name: dup
nodes:
  - { id: a, type: log }
  - { id: a, type: log }
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(ref msg) if msg.contains("duplicate node id")));
    }

    #[test]
    fn test_parse_rejects_missing_dependency() {
        let yaml = r#"
name: broken
nodes:
  - { id: a, type: log, depends_on: [ghost] }
"#;
        assert!(matches!(
            parse_workflow_yaml(yaml),
            Err(DefinitionError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_cycle() {
        let yaml = r#"
name: loop
nodes:
  - { id: a, type: log, depends_on: [b] }
  - { id: b, type: log, depends_on: [a] }
"#;
        assert!(matches!(parse_workflow_yaml(yaml), Err(DefinitionError::Cycle { .. })));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(parse_workflow_yaml("nodes: ["), Err(DefinitionError::Parse(_))));
        assert!(matches!(parse_workflow_json("{"), Err(DefinitionError::Parse(_))));
    }

    #[test]
    fn test_guard_errors() {
        let def = WorkflowDefinition::new(
            "g",
            None,
            TriggerSpec::default(),
            vec![
                NodeDefinition::new("ok", "log").when("has_result('x') and x > 1"),
                NodeDefinition::new("bad", "log").when("x.__class__"),
                NodeDefinition::new("typo", "log").when("x >"),
                NodeDefinition::new("none", "log"),
            ],
        )
        .unwrap();
        let errors = guard_errors(&def);
        let ids: Vec<&str> = errors.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["bad", "typo"]);
        assert!(matches!(errors[0].1, ExpressionError::Unsafe(_)));
        assert!(matches!(errors[1].1, ExpressionError::Syntax(_)));
    }

    #[test]
    fn test_load_by_extension_and_save() {
        let dir = tempfile::TempDir::new().unwrap();

        let yaml_path = dir.path().join("flow.yaml");
        std::fs::write(&yaml_path, PIPELINE).unwrap();
        let def = load_workflow_file(&yaml_path).unwrap();
        assert_eq!(def.name(), "pipeline");

        let json_path = dir.path().join("flow.json");
        std::fs::write(
            &json_path,
            json!({"name": "from-json", "nodes": [{"id": "a", "type": "log"}]}).to_string(),
        )
        .unwrap();
        assert_eq!(load_workflow_file(&json_path).unwrap().name(), "from-json");

        let saved = dir.path().join("nested/out.yaml");
        save_workflow_file(&saved, &def).unwrap();
        let reloaded = load_workflow_file(&saved).unwrap();
        assert_eq!(reloaded.nodes(), def.nodes());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_workflow_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, DefinitionError::Io(_)));
    }
}
