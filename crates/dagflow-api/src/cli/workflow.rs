//! Workflow subcommands: run, validate, plan.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};

use dagflow_core::NodeRegistry;
use dagflow_core::workflow::context::NodeStatus;
use dagflow_core::workflow::dag::build_execution_plan;
use dagflow_core::workflow::definition::{guard_errors, load_workflow_file};
use dagflow_types::workflow::WorkflowDefinition;

use crate::state::AppState;

fn load(file: &Path) -> Result<WorkflowDefinition> {
    load_workflow_file(file).with_context(|| format!("Failed to load workflow '{}'", file.display()))
}

fn parse_payload(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw).context("--payload is not valid JSON")? {
        Value::Object(map) => Ok(Some(map)),
        other => bail!("--payload must be a JSON object, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run a workflow file. Returns `true` when at least one node errored.
pub async fn handle_run(
    state: &AppState,
    file: &Path,
    payload: Option<&str>,
    run_id: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<bool> {
    let def = load(file)?;
    let initial = parse_payload(payload)?;

    let ctx = state.engine.run(&def, run_id, initial).await?;
    let summary = ctx.summarize(def.node_ids());
    let failed = summary.iter().any(|(_, status)| status.is_error());

    if json {
        let mut out = ctx.to_json();
        out["summary"] = summary
            .iter()
            .map(|(id, status)| (id.clone(), Value::String(status.to_string())))
            .collect::<Map<String, Value>>()
            .into();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(failed);
    }
    if quiet {
        return Ok(failed);
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Result"),
        ]);

    for (id, status) in &summary {
        let (status_cell, detail) = match status {
            NodeStatus::Ok => (
                Cell::new("ok").fg(Color::Green),
                ctx.get_result(id).map(|v| preview(&v)).unwrap_or_default(),
            ),
            NodeStatus::Error(message) => (Cell::new("error").fg(Color::Red), message.clone()),
            NodeStatus::Skipped => (Cell::new("skipped").fg(Color::Yellow), String::new()),
        };
        table.add_row(vec![Cell::new(id), status_cell, Cell::new(detail)]);
    }

    println!();
    println!(
        "  {} Workflow '{}' run {}",
        if failed {
            style("!").red().bold()
        } else {
            style("*").green().bold()
        },
        style(def.name()).cyan(),
        style(ctx.run_id()).dim()
    );
    println!();
    println!("{table}");
    println!();

    Ok(failed)
}

/// Single-line result preview for the table.
fn preview(value: &Value) -> String {
    const MAX: usize = 80;
    let text = value.to_string();
    if text.chars().count() <= MAX {
        return text;
    }
    let mut cut: String = text.chars().take(MAX - 3).collect();
    cut.push_str("...");
    cut
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Problems beyond parse and graph errors: bad guards and unknown node types.
fn collect_problems(def: &WorkflowDefinition, registry: &NodeRegistry) -> Vec<String> {
    let mut problems: Vec<String> = guard_errors(def)
        .into_iter()
        .map(|(id, err)| format!("node '{id}': invalid when guard: {err}"))
        .collect();
    problems.extend(
        def.nodes()
            .iter()
            .filter(|node| !registry.contains(&node.node_type))
            .map(|node| format!("node '{}': unknown node type '{}'", node.id, node.node_type)),
    );
    problems
}

pub fn handle_validate(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let def = load(file)?;
    let problems = collect_problems(&def, state.registry());

    if json {
        let out = serde_json::json!({
            "name": def.name(),
            "nodes": def.nodes().len(),
            "valid": problems.is_empty(),
            "problems": problems,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if problems.is_empty() {
        println!();
        println!(
            "  {} Workflow '{}' is valid ({} nodes)",
            style("*").green().bold(),
            style(def.name()).cyan(),
            def.nodes().len()
        );
        println!();
    } else {
        println!();
        for problem in &problems {
            println!("  {} {problem}", style("x").red().bold());
        }
        println!();
    }

    if !problems.is_empty() {
        bail!("workflow '{}' has {} problem(s)", def.name(), problems.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

pub fn handle_plan(file: &Path, json: bool) -> Result<()> {
    let def = load(file)?;
    let waves = build_execution_plan(def.nodes())?;

    if json {
        let out: Vec<Vec<&str>> = waves
            .iter()
            .map(|wave| wave.iter().map(|node| node.id.as_str()).collect())
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Wave").fg(Color::Cyan),
            Cell::new("Node"),
            Cell::new("Type"),
            Cell::new("Depends on"),
            Cell::new("When"),
            Cell::new("On error"),
        ]);

    for (index, wave) in waves.iter().enumerate() {
        for node in wave {
            table.add_row(vec![
                Cell::new(index),
                Cell::new(&node.id),
                Cell::new(&node.node_type),
                Cell::new(node.depends_on.join(", ")),
                Cell::new(node.when.as_deref().unwrap_or("")),
                Cell::new(node.on_error.to_string()),
            ]);
        }
    }

    println!();
    println!("  Workflow: {}", style(def.name()).cyan());
    if let Some(description) = def.description() {
        println!("  {}", style(description).dim());
    }
    println!();
    println!("{table}");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_core::workflow::definition::parse_workflow_yaml;
    use dagflow_infra::builtin_registry;
    use dagflow_types::config::EngineConfig;

    #[test]
    fn test_parse_payload() {
        assert!(parse_payload(None).unwrap().is_none());
        let map = parse_payload(Some(r#"{"user": "ada"}"#)).unwrap().unwrap();
        assert_eq!(map["user"], Value::String("ada".to_string()));
        assert!(parse_payload(Some("[1]")).is_err());
        assert!(parse_payload(Some("{")).is_err());
    }

    #[test]
    fn test_collect_problems() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = builtin_registry(&EngineConfig::default(), tmp.path()).unwrap();
        let def = parse_workflow_yaml(
            r#"
name: checks
nodes:
  - { id: a, type: transform, when: "x.__class__" }
  - { id: b, type: teleport }
  - { id: c, type: log, when: "has_result('a')" }
"#,
        )
        .unwrap();
        let problems = collect_problems(&def, &registry);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("node 'a': invalid when guard"));
        assert_eq!(problems[1], "node 'b': unknown node type 'teleport'");
    }

    #[test]
    fn test_preview_truncates() {
        let long = Value::String("x".repeat(200));
        let text = preview(&long);
        assert_eq!(text.chars().count(), 80);
        assert!(text.ends_with("..."));
        assert_eq!(preview(&Value::from(3)), "3");
    }
}
