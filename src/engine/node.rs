// ABOUTME: Task tree model, per-node execution state, and the execution registry
// ABOUTME: Builds the node arena from a normalized configuration in one top-down pass

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::TaskSpec;

/// Execution state machine values for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
    WaitingHuman,
}

impl TaskStatus {
    /// Whether this status ends the node's participation in the current pass.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::WaitingHuman => write!(f, "waiting_human"),
        }
    }
}

/// Immutable per-node descriptor. Built once at tree construction; nodes are
/// held only by the registry and reference each other by id, so the
/// parent/child links never form an ownership cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub name: String,
    pub action: Option<String>,
    pub parallel: bool,
    pub human_gate: bool,
    pub depends_on: Vec<String>,
    /// Child ids in input order. Sequential scheduling follows this order.
    pub children: Vec<String>,
    /// Parent id, for path computation and reporting only.
    pub parent: Option<String>,
    /// Derived at build time: parent path + "/" + id, or the id for the root.
    pub path: String,
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
}

impl TaskNode {
    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Mutable transient state for one node. Each instance lives behind its own
/// lock inside the registry; only the node's logical worker writes it, every
/// other worker may read it through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            status: TaskStatus::Pending,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
        }
    }
}

struct RegistryEntry {
    node: Arc<TaskNode>,
    state: Arc<RwLock<TaskState>>,
}

/// Id-keyed arena of every node in the tree plus its execution state.
/// Built once per run; entries are never inserted or removed mid-run, only
/// their states are updated.
pub struct TaskRegistry {
    entries: IndexMap<String, RegistryEntry>,
    root_id: String,
}

impl TaskRegistry {
    /// Build the task tree from a normalized description in a single
    /// depth-first pass. Ids missing from the input are synthesized as
    /// `root` for the top node and `task_<N>` for descendants, where N is
    /// the number of nodes registered before it.
    pub fn build(spec: &TaskSpec) -> Self {
        let mut nodes = Vec::new();
        build_node(spec, None, "", &mut nodes);

        let root_id = nodes[0].id.clone();
        let mut entries = IndexMap::with_capacity(nodes.len());
        for node in nodes {
            entries.insert(
                node.id.clone(),
                RegistryEntry {
                    node: Arc::new(node),
                    state: Arc::new(RwLock::new(TaskState::default())),
                },
            );
        }

        Self { entries, root_id }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn root(&self) -> Arc<TaskNode> {
        self.entries[&self.root_id].node.clone()
    }

    pub fn node(&self, id: &str) -> Option<Arc<TaskNode>> {
        self.entries.get(id).map(|e| e.node.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node ids in registration (depth-first input) order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub async fn status(&self, id: &str) -> Option<TaskStatus> {
        match self.entries.get(id) {
            Some(entry) => Some(entry.state.read().await.status),
            None => None,
        }
    }

    pub async fn state(&self, id: &str) -> Option<TaskState> {
        match self.entries.get(id) {
            Some(entry) => Some(entry.state.read().await.clone()),
            None => None,
        }
    }

    pub async fn set_status(&self, id: &str, status: TaskStatus) {
        if let Some(entry) = self.entries.get(id) {
            entry.state.write().await.status = status;
        }
    }

    pub async fn mark_started(&self, id: &str) {
        if let Some(entry) = self.entries.get(id) {
            let mut state = entry.state.write().await;
            state.status = TaskStatus::Running;
            state.started_at = Some(Utc::now());
        }
    }

    pub async fn mark_completed(&self, id: &str) {
        if let Some(entry) = self.entries.get(id) {
            let mut state = entry.state.write().await;
            state.status = TaskStatus::Completed;
            state.ended_at = Some(Utc::now());
        }
    }

    pub async fn mark_failed(&self, id: &str, reason: String) {
        if let Some(entry) = self.entries.get(id) {
            let mut state = entry.state.write().await;
            state.status = TaskStatus::Failed;
            state.ended_at = Some(Utc::now());
            state.error = Some(reason);
        }
    }

    pub async fn set_result(&self, id: &str, result: serde_json::Value) {
        if let Some(entry) = self.entries.get(id) {
            entry.state.write().await.result = Some(result);
        }
    }

    /// Clear a node's transient state ahead of a retry: status back to
    /// `Pending`, payload/error/timestamps wiped. The node then re-enters
    /// the state machine from the top.
    pub async fn reset_transient(&self, id: &str) {
        if let Some(entry) = self.entries.get(id) {
            *entry.state.write().await = TaskState::default();
        }
    }
}

fn build_node(
    spec: &TaskSpec,
    parent: Option<&str>,
    parent_path: &str,
    nodes: &mut Vec<TaskNode>,
) -> usize {
    let id = match (&spec.id, parent) {
        (Some(id), _) => id.clone(),
        (None, None) => "root".to_string(),
        (None, Some(_)) => format!("task_{}", nodes.len()),
    };

    let path = if parent.is_some() {
        format!("{}/{}", parent_path, id)
    } else {
        id.clone()
    };

    let index = nodes.len();
    nodes.push(TaskNode {
        id: id.clone(),
        name: spec.task.clone(),
        action: spec.action.clone(),
        parallel: spec.parallel,
        human_gate: spec.human_gate,
        depends_on: spec.depends_on.clone(),
        children: Vec::new(),
        parent: parent.map(String::from),
        path,
        timeout: spec.timeout,
    });

    let parent_path = nodes[index].path.clone();
    let mut children = Vec::with_capacity(spec.sub_tasks.len());
    for sub_spec in &spec.sub_tasks {
        let child_index = build_node(sub_spec, Some(&id), &parent_path, nodes);
        children.push(nodes[child_index].id.clone());
    }
    nodes[index].children = children;

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> TaskSpec {
        TaskSpec::new("release")
            .with_id("release")
            .with_sub_task(
                TaskSpec::new("build")
                    .with_id("build")
                    .with_action("cargo build"),
            )
            .with_sub_task(
                TaskSpec::new("deploy")
                    .with_id("deploy")
                    .depends_on(vec!["build"])
                    .with_sub_task(TaskSpec::new("deploy east").with_id("east"))
                    .with_sub_task(TaskSpec::new("deploy west").with_id("west")),
            )
    }

    #[test]
    fn test_build_registers_all_nodes_in_input_order() {
        let registry = TaskRegistry::build(&sample_spec());
        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.ids(),
            vec!["release", "build", "deploy", "east", "west"]
        );
        assert_eq!(registry.root_id(), "release");
    }

    #[test]
    fn test_paths_derive_from_parent() {
        let registry = TaskRegistry::build(&sample_spec());

        assert_eq!(registry.node("release").unwrap().path, "release");
        assert_eq!(registry.node("build").unwrap().path, "release/build");
        assert_eq!(registry.node("east").unwrap().path, "release/deploy/east");

        for id in registry.ids() {
            let node = registry.node(&id).unwrap();
            match &node.parent {
                Some(parent_id) => {
                    let parent = registry.node(parent_id).unwrap();
                    assert_eq!(node.path, format!("{}/{}", parent.path, node.id));
                }
                None => assert_eq!(node.path, node.id),
            }
        }
    }

    #[test]
    fn test_id_synthesis_counts_registered_nodes() {
        let spec = TaskSpec::new("anonymous root")
            .with_sub_task(TaskSpec::new("first child"))
            .with_sub_task(
                TaskSpec::new("second child").with_sub_task(TaskSpec::new("grandchild")),
            );

        let registry = TaskRegistry::build(&spec);
        assert_eq!(registry.ids(), vec!["root", "task_1", "task_2", "task_3"]);
        assert_eq!(registry.node("task_3").unwrap().path, "root/task_2/task_3");
    }

    #[test]
    fn test_children_preserve_input_order() {
        let registry = TaskRegistry::build(&sample_spec());
        let deploy = registry.node("deploy").unwrap();
        assert_eq!(deploy.children, vec!["east", "west"]);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let registry = TaskRegistry::build(&sample_spec());

        assert_eq!(registry.status("build").await, Some(TaskStatus::Pending));

        registry.mark_started("build").await;
        let state = registry.state("build").await.unwrap();
        assert_eq!(state.status, TaskStatus::Running);
        assert!(state.started_at.is_some());

        registry.set_result("build", serde_json::json!({"ok": true})).await;
        registry.mark_completed("build").await;
        let state = registry.state("build").await.unwrap();
        assert_eq!(state.status, TaskStatus::Completed);
        assert!(state.ended_at.is_some());
        assert!(state.result.is_some());
    }

    #[tokio::test]
    async fn test_reset_transient_clears_everything() {
        let registry = TaskRegistry::build(&sample_spec());

        registry.mark_started("build").await;
        registry.mark_failed("build", "boom".to_string()).await;
        registry.reset_transient("build").await;

        let state = registry.state("build").await.unwrap();
        assert_eq!(state.status, TaskStatus::Pending);
        assert!(state.started_at.is_none());
        assert!(state.ended_at.is_none());
        assert!(state.result.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_harmless() {
        let registry = TaskRegistry::build(&sample_spec());
        registry.mark_started("missing").await;
        assert_eq!(registry.status("missing").await, None);
        assert!(registry.node("missing").is_none());
    }
}
