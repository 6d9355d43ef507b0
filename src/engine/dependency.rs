// ABOUTME: Dependency graph management, cycle detection, and readiness checks
// ABOUTME: Operates over the global id -> depends_on graph of the whole tree

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::Graph;
use std::collections::HashMap;
use tracing::warn;

use super::error::{EngineError, Result};
use super::node::{TaskNode, TaskRegistry, TaskStatus};

/// Directed graph over every node's `depends_on` edges, used for the
/// pre-flight cycle check. Readiness at execution time is answered against
/// the live registry instead, since it depends on mutable status.
pub struct DependencyGraph {
    graph: Graph<String, ()>,
    task_indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the dependency graph from a fully constructed registry.
    /// Edges naming unknown ids are skipped here; the readiness check treats
    /// them as permanently unmet.
    pub fn from_registry(registry: &TaskRegistry) -> Self {
        let mut graph = Graph::new();
        let mut task_indices = HashMap::new();

        for task_id in registry.ids() {
            let node_index = graph.add_node(task_id.clone());
            task_indices.insert(task_id, node_index);
        }

        for task_id in registry.ids() {
            let node = registry.node(&task_id).expect("registered id");
            let task_node = task_indices[&task_id];

            for dependency in &node.depends_on {
                match task_indices.get(dependency) {
                    Some(&dep_node) => {
                        graph.add_edge(dep_node, task_node, ());
                    }
                    None => {
                        warn!(
                            task_id = %task_id,
                            dependency = %dependency,
                            "dependency references an unregistered task"
                        );
                    }
                }
            }
        }

        Self {
            graph,
            task_indices,
        }
    }

    /// Find every dependency cycle in the graph. A cycle is reported as the
    /// list of member ids in registration order. The result is a pure
    /// function of the graph: re-running on an unchanged graph yields the
    /// identical list.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();

        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || self
                    .graph
                    .find_edge(component[0], component[0])
                    .is_some();

            if is_cycle {
                let mut members: Vec<String> = component
                    .iter()
                    .map(|&idx| self.graph[idx].clone())
                    .collect();
                members.sort_by_key(|id| self.task_indices[id].index());
                cycles.push(members);
            }
        }

        cycles.sort_by_key(|cycle| self.task_indices[&cycle[0]].index());
        cycles
    }

    /// Pre-flight validation: any cycle is a fatal configuration error and
    /// the run must not start.
    pub fn preflight(&self) -> Result<()> {
        let cycles = self.find_cycles();
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(EngineError::CircularDependency { cycles })
        }
    }

    /// Ids the given task depends on directly.
    pub fn dependencies_of(&self, task_id: &str) -> Vec<String> {
        match self.task_indices.get(task_id) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .map(|dep| self.graph[dep].clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Readiness check for a single node: every dependency resolves to a
/// registered node whose status is exactly `Completed`. An id missing from
/// the registry makes the node permanently not-ready for this run.
pub async fn is_ready(registry: &TaskRegistry, node: &TaskNode) -> bool {
    for dep_id in &node.depends_on {
        match registry.status(dep_id).await {
            Some(TaskStatus::Completed) => continue,
            Some(_) => return false,
            None => {
                warn!(
                    task_id = %node.id,
                    dependency = %dep_id,
                    "dependency not found in registry"
                );
                return false;
            }
        }
    }
    true
}
