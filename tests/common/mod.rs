// ABOUTME: Common fixtures and helpers for integration tests
// ABOUTME: Provides scripted executors and approval gates for exercising the engine

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use trellis::engine::TaskNode;
use trellis::{ActionExecutor, ApprovalGate, GateDecision};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Executor that fails for the listed task ids and succeeds for the rest,
/// recording the order in which actions were invoked.
pub struct ScriptedExecutor {
    failing: HashSet<String>,
    delay: Option<Duration>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            delay: None,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_ids(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self, task_id: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == task_id)
            .count()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(&self, node: &TaskNode) -> anyhow::Result<serde_json::Value> {
        self.invocations.lock().unwrap().push(node.id.clone());

        if let Some(delay) = self.delay {
            sleep(delay).await;
        }

        if self.failing.contains(&node.id) {
            anyhow::bail!("scripted failure for {}", node.id);
        }
        Ok(serde_json::json!({ "task": node.id }))
    }
}

/// Executor that fails the first N invocations per task id, then succeeds.
pub struct FlakyExecutor {
    failures_before_success: usize,
    counts: Mutex<HashMap<String, usize>>,
}

impl FlakyExecutor {
    pub fn new(failures_before_success: usize) -> Self {
        Self {
            failures_before_success,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self, task_id: &str) -> usize {
        self.counts.lock().unwrap().get(task_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ActionExecutor for FlakyExecutor {
    async fn execute(&self, node: &TaskNode) -> anyhow::Result<serde_json::Value> {
        let attempt = {
            let mut counts = self.counts.lock().unwrap();
            let entry = counts.entry(node.id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if attempt <= self.failures_before_success {
            anyhow::bail!("flaky failure {} for {}", attempt, node.id);
        }
        Ok(serde_json::json!({ "task": node.id, "attempt": attempt }))
    }
}

/// Executor whose actions never return within any reasonable test budget.
pub struct HangingExecutor;

#[async_trait]
impl ActionExecutor for HangingExecutor {
    async fn execute(&self, _node: &TaskNode) -> anyhow::Result<serde_json::Value> {
        sleep(Duration::from_secs(3600)).await;
        Ok(serde_json::json!({}))
    }
}

/// Approval gate that rejects the listed task ids and approves the rest.
pub struct ScriptedGate {
    rejecting: HashSet<String>,
    reviewed: Mutex<Vec<String>>,
}

impl ScriptedGate {
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            rejecting: ids.iter().map(|s| s.to_string()).collect(),
            reviewed: Mutex::new(Vec::new()),
        }
    }

    pub fn reviewed(&self) -> Vec<String> {
        self.reviewed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalGate for ScriptedGate {
    async fn review(&self, node: &TaskNode) -> GateDecision {
        self.reviewed.lock().unwrap().push(node.id.clone());
        if self.rejecting.contains(&node.id) {
            GateDecision::Reject
        } else {
            GateDecision::Approve
        }
    }
}
