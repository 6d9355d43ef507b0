// ABOUTME: Task execution engine module for the trellis orchestrator
// ABOUTME: Handles tree construction, dependency gating, scheduling, retries, and timeouts

pub mod dependency;
pub mod error;
pub mod node;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod timeout;

pub use dependency::DependencyGraph;
pub use error::{EngineError, Result};
pub use node::{TaskNode, TaskRegistry, TaskState, TaskStatus};
pub use report::{NodeSnapshot, RunReport, RunSummary};
pub use retry::{AttemptOutcome, BackoffStrategy, RetryController, RetryPolicy};
pub use scheduler::Scheduler;
pub use timeout::TimeoutGuard;
