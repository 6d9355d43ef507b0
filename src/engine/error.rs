// ABOUTME: Error types for the task execution engine
// ABOUTME: Defines the failure taxonomy for runs, actions, and child aggregation

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Fatal pre-run configuration defect. The run never starts.
    #[error("circular dependency detected: {}", format_cycles(.cycles))]
    CircularDependency { cycles: Vec<Vec<String>> },

    /// The action raised an error.
    #[error("action failed for task '{task_id}': {message}")]
    ActionFailed { task_id: String, message: String },

    /// The action ran past its timeout and was abandoned.
    #[error("task '{task_id}' timed out after {timeout:?}")]
    ActionTimeout { task_id: String, timeout: Duration },

    /// One or more children failed after exhausting their own retries.
    #[error("{} of {total} child tasks of '{task_id}' failed: {}", .failures.len(), format_failed_ids(.failures))]
    ChildrenFailed {
        task_id: String,
        total: usize,
        failures: Vec<ChildFailure>,
    },

    /// A parallel child worker was lost before producing an outcome.
    #[error("child worker for '{task_id}' did not report an outcome: {message}")]
    WorkerLost { task_id: String, message: String },

    #[error("task not found in registry: {task_id}")]
    TaskNotFound { task_id: String },
}

/// A single failed child recorded by the fork-join aggregation step.
#[derive(Debug, Clone)]
pub struct ChildFailure {
    pub task_id: String,
    pub reason: String,
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_failed_ids(failures: &[ChildFailure]) -> String {
    failures
        .iter()
        .map(|f| f.task_id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_failed_message_names_every_child() {
        let err = EngineError::ChildrenFailed {
            task_id: "parent".to_string(),
            total: 5,
            failures: vec![
                ChildFailure {
                    task_id: "b".to_string(),
                    reason: "boom".to_string(),
                },
                ChildFailure {
                    task_id: "d".to_string(),
                    reason: "bust".to_string(),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("2 of 5"));
        assert!(message.contains("b, d"));
    }

    #[test]
    fn test_circular_dependency_message() {
        let err = EngineError::CircularDependency {
            cycles: vec![vec!["a".to_string(), "b".to_string()]],
        };
        assert!(err.to_string().contains("a -> b"));
    }
}
