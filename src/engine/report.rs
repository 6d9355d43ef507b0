// ABOUTME: Read-only run report for snapshot and reporting collaborators
// ABOUTME: Captures every node's descriptor and final state without exposing engine internals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::node::{TaskRegistry, TaskStatus};

/// Point-in-time view of one node: its immutable descriptor plus the
/// execution state recorded by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub name: String,
    pub path: String,
    pub action: Option<String>,
    pub parallel: bool,
    pub human_gate: bool,
    pub depends_on: Vec<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl NodeSnapshot {
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// Per-status node counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub waiting_human: usize,
    pub pending: usize,
    pub running: usize,
}

/// Complete result of one execution pass: every node's snapshot in
/// registration order, with enough information to reconstruct the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub root_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub nodes: Vec<NodeSnapshot>,
}

impl RunReport {
    /// Capture a report from the registry after a pass finishes.
    pub async fn capture(
        run_id: String,
        registry: &TaskRegistry,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut nodes = Vec::with_capacity(registry.len());
        for id in registry.ids() {
            let node = registry.node(&id).expect("registered id");
            let state = registry.state(&id).await.expect("registered id");
            nodes.push(NodeSnapshot {
                id: node.id.clone(),
                name: node.name.clone(),
                path: node.path.clone(),
                action: node.action.clone(),
                parallel: node.parallel,
                human_gate: node.human_gate,
                depends_on: node.depends_on.clone(),
                parent: node.parent.clone(),
                children: node.children.clone(),
                status: state.status,
                started_at: state.started_at,
                ended_at: state.ended_at,
                result: state.result,
                error: state.error,
            });
        }

        Self {
            run_id,
            root_id: registry.root_id().to_string(),
            started_at,
            ended_at: Utc::now(),
            nodes,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.node(id).map(|n| n.status)
    }

    pub fn root_status(&self) -> TaskStatus {
        self.node(&self.root_id)
            .map(|n| n.status)
            .unwrap_or(TaskStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        self.root_status() == TaskStatus::Completed
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.nodes.len(),
            ..RunSummary::default()
        };

        for node in &self.nodes {
            match node.status {
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Blocked => summary.blocked += 1,
                TaskStatus::WaitingHuman => summary.waiting_human += 1,
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Running => summary.running += 1,
            }
        }

        summary
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
