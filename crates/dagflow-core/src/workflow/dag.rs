//! Graph checks and static wave planning.
//!
//! `validate_graph` is the pre-run check the engine performs: every
//! dependency must name an existing node and the graph must be acyclic.
//! `build_execution_plan` groups nodes by dependency depth with `petgraph`
//! for display; the executor itself schedules dynamically from the ready set.

use std::collections::{HashMap, HashSet};

use dagflow_types::error::DefinitionError;
use dagflow_types::workflow::NodeDefinition;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check dependency references, then acyclicity.
///
/// Missing dependencies are reported first, in declaration order. Cycle
/// detection is a depth-first walk over `depends_on` edges; reaching a node
/// that is still on the walk stack reports that node.
pub fn validate_graph(nodes: &[NodeDefinition]) -> Result<(), DefinitionError> {
    let by_id: HashMap<&str, &NodeDefinition> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    for node in nodes {
        for dep in &node.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                return Err(DefinitionError::MissingDependency {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    for root in nodes {
        if visited.contains(root.id.as_str()) {
            continue;
        }

        // (node, index of the next dependency to explore)
        let mut stack: Vec<(&NodeDefinition, usize)> = vec![(root, 0)];
        visited.insert(root.id.as_str());
        on_stack.insert(root.id.as_str());

        while let Some(top) = stack.last_mut() {
            let node: &NodeDefinition = top.0;
            let next = top.1;
            top.1 += 1;

            let Some(dep) = node.depends_on.get(next) else {
                on_stack.remove(node.id.as_str());
                stack.pop();
                continue;
            };

            if on_stack.contains(dep.as_str()) {
                return Err(DefinitionError::Cycle { node: dep.clone() });
            }
            if visited.insert(dep.as_str()) {
                on_stack.insert(dep.as_str());
                stack.push((by_id[dep.as_str()], 0));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Execution plan (wave computation)
// ---------------------------------------------------------------------------

/// Group nodes into waves by dependency depth.
///
/// Wave 0 holds nodes with no dependencies; every other node sits one wave
/// after its deepest dependency. Within a wave, nodes keep declaration order.
pub fn build_execution_plan(
    nodes: &[NodeDefinition],
) -> Result<Vec<Vec<&NodeDefinition>>, DefinitionError> {
    if nodes.is_empty() {
        return Ok(vec![]);
    }

    let id_to_idx: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    // Edge from dependency -> dependent
    let mut graph = DiGraph::<usize, ()>::new();
    let indices: Vec<_> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

    for (to, node) in nodes.iter().enumerate() {
        for dep in &node.depends_on {
            let from = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                DefinitionError::MissingDependency {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                }
            })?;
            graph.add_edge(indices[*from], indices[to], ());
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| DefinitionError::Cycle {
        node: nodes[graph[cycle.node_id()]].id.clone(),
    })?;

    let mut depths = vec![0usize; nodes.len()];
    for idx in sorted {
        let i = graph[idx];
        depths[i] = nodes[i]
            .depends_on
            .iter()
            .map(|dep| depths[id_to_idx[dep.as_str()]] + 1)
            .max()
            .unwrap_or(0);
    }

    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&NodeDefinition>> = vec![vec![]; max_depth + 1];
    for (i, node) in nodes.iter().enumerate() {
        waves[depths[i]].push(node);
    }

    Ok(waves)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> NodeDefinition {
        NodeDefinition::new(id, "noop").depends_on(deps.iter().copied())
    }

    fn wave_ids(waves: &[Vec<&NodeDefinition>]) -> Vec<Vec<String>> {
        waves
            .iter()
            .map(|w| w.iter().map(|n| n.id.clone()).collect())
            .collect()
    }

    #[test]
    fn test_valid_graph() {
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])];
        assert!(validate_graph(&nodes).is_ok());
    }

    #[test]
    fn test_missing_dependency() {
        let nodes = vec![node("a", &[]), node("b", &["ghost"])];
        match validate_graph(&nodes).unwrap_err() {
            DefinitionError::MissingDependency { node, dependency } => {
                assert_eq!(node, "b");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let nodes = vec![node("a", &["b"]), node("b", &["a"])];
        match validate_graph(&nodes).unwrap_err() {
            DefinitionError::Cycle { node } => assert_eq!(node, "a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_loop() {
        let nodes = vec![node("a", &["a"])];
        assert!(matches!(
            validate_graph(&nodes),
            Err(DefinitionError::Cycle { node }) if node == "a"
        ));
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        let nodes = vec![
            node("root", &[]),
            node("x", &["root", "z"]),
            node("y", &["x"]),
            node("z", &["y"]),
        ];
        assert!(matches!(validate_graph(&nodes), Err(DefinitionError::Cycle { .. })));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ];
        assert!(validate_graph(&nodes).is_ok());
    }

    #[test]
    fn test_missing_dependency_reported_before_cycle() {
        let nodes = vec![node("a", &["b"]), node("b", &["a", "ghost"])];
        assert!(matches!(
            validate_graph(&nodes),
            Err(DefinitionError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_execution_plan_waves() {
        let nodes = vec![
            node("fetch", &[]),
            node("config", &[]),
            node("parse", &["fetch"]),
            node("report", &["parse", "config"]),
        ];
        let waves = build_execution_plan(&nodes).unwrap();
        assert_eq!(
            wave_ids(&waves),
            vec![
                vec!["fetch".to_string(), "config".to_string()],
                vec!["parse".to_string()],
                vec!["report".to_string()],
            ]
        );
    }

    #[test]
    fn test_execution_plan_empty() {
        assert!(build_execution_plan(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_execution_plan_rejects_cycle() {
        let nodes = vec![node("a", &["b"]), node("b", &["a"])];
        assert!(matches!(
            build_execution_plan(&nodes),
            Err(DefinitionError::Cycle { .. })
        ));
    }
}
