// ABOUTME: Normalized task-tree description and engine-wide settings
// ABOUTME: Defines the handoff types supplied by the configuration provider

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::retry::RetryPolicy;

/// One record of the normalized task-tree description. The upstream
/// configuration provider is responsible for structural validation (unique
/// ids, acyclic nesting, well-formed fields); the engine consumes this as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Human-readable task name.
    pub task: String,
    /// Explicit node id. When absent the tree builder synthesizes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque action descriptor handed to the action executor. A node with
    /// no action only coordinates its children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Run children concurrently instead of in input order.
    #[serde(default)]
    pub parallel: bool,
    /// Pause for external approval before this node runs.
    #[serde(default)]
    pub human_gate: bool,
    /// Ids of nodes (anywhere in the tree) that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Ordered child tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tasks: Vec<TaskSpec>,
    /// Per-task timeout override for the action invocation.
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            id: None,
            action: None,
            parallel: false,
            human_gate: false,
            depends_on: Vec::new(),
            sub_tasks: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn with_human_gate(mut self) -> Self {
        self.human_gate = true;
        self
    }

    pub fn depends_on(mut self, ids: Vec<&str>) -> Self {
        self.depends_on = ids.into_iter().map(String::from).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_sub_task(mut self, sub_task: TaskSpec) -> Self {
        self.sub_tasks.push(sub_task);
        self
    }

    /// Parse a normalized description from YAML.
    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse a normalized description from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Total number of nodes described, this record included.
    pub fn node_count(&self) -> usize {
        1 + self.sub_tasks.iter().map(TaskSpec::node_count).sum::<usize>()
    }
}

/// Engine-wide execution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Default bound on a single action invocation. `None` means unbounded
    /// unless a task carries its own timeout.
    #[serde(with = "humantime_serde", default)]
    pub default_timeout: Option<Duration>,
    /// Retry policy for failed nodes. `None` disables retrying entirely.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl EngineSettings {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}
