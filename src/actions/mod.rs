// ABOUTME: Collaborator traits for action execution and human approval gates
// ABOUTME: The engine treats both as opaque, possibly long-blocking capability calls

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::engine::TaskNode;

/// Performs the actual work behind a node's action descriptor. Calls may
/// take unbounded time; the engine always wraps them in the timeout guard.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, node: &TaskNode) -> anyhow::Result<serde_json::Value>;
}

/// Outcome of a human gate review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approve,
    Reject,
}

/// Supplies approve/reject decisions for nodes carrying a human gate. The
/// call may block indefinitely on a human; the scheduler awaits it without
/// holding any node lock.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn review(&self, node: &TaskNode) -> GateDecision;
}

/// Executor that performs no real work and echoes the action descriptor
/// back as the result payload. Useful for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor;

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(&self, node: &TaskNode) -> anyhow::Result<serde_json::Value> {
        debug!(task_id = %node.id, action = ?node.action, "simulating action");
        Ok(json!({
            "status": "executed",
            "action": node.action,
        }))
    }
}

/// Gate that approves every node without asking anyone.
#[derive(Debug, Clone, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn review(&self, _node: &TaskNode) -> GateDecision {
        GateDecision::Approve
    }
}
