// ABOUTME: Main library module for the trellis task orchestration engine
// ABOUTME: Exports all core modules and provides the public API

pub mod actions;
pub mod config;
pub mod engine;

// Re-export commonly used types
pub use actions::{ActionExecutor, ApprovalGate, AutoApprove, GateDecision, SimulatedExecutor};
pub use config::{EngineSettings, TaskSpec};
pub use engine::{
    BackoffStrategy, EngineError, NodeSnapshot, RetryController, RetryPolicy, RunReport,
    RunSummary, Scheduler, TaskNode, TaskRegistry, TaskStatus, TimeoutGuard,
};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
