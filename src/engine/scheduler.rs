// ABOUTME: Execution scheduler driving every node through the state machine
// ABOUTME: Handles dependency gating, human gates, fork-join children, retries, and timeouts

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::dependency::{self, DependencyGraph};
use super::error::{ChildFailure, EngineError, Result};
use super::node::{TaskNode, TaskRegistry, TaskStatus};
use super::report::RunReport;
use super::retry::{AttemptOutcome, RetryController};
use super::timeout::TimeoutGuard;
use crate::actions::{ActionExecutor, ApprovalGate, AutoApprove, GateDecision, SimulatedExecutor};
use crate::config::{EngineSettings, TaskSpec};

/// Outcome of one node's pass through the execution protocol. `Blocked` and
/// `GateRejected` are non-completed terminal outcomes that do not count as
/// failures for the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeOutcome {
    Completed,
    Blocked,
    GateRejected,
    Failed { task_id: String, reason: String },
}

/// The execution engine proper. Owns one task tree per run and drives every
/// node to a terminal state. All fields are shared handles, so the scheduler
/// clones cheaply into spawned child workers.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    retry: Option<Arc<RetryController>>,
    timeout_guard: TimeoutGuard,
    executor: Arc<dyn ActionExecutor>,
    approval: Arc<dyn ApprovalGate>,
    run_id: String,
}

impl Scheduler {
    /// Build a scheduler for one run of the given tree. Defaults to the
    /// simulated executor and auto-approval; real deployments supply their
    /// own collaborators via `with_executor` / `with_approval`.
    pub fn new(spec: &TaskSpec, settings: EngineSettings) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::build(spec)),
            retry: settings.retry.map(|policy| Arc::new(RetryController::new(policy))),
            timeout_guard: TimeoutGuard::new(settings.default_timeout),
            executor: Arc::new(SimulatedExecutor),
            approval: Arc::new(AutoApprove),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_approval(mut self, approval: Arc<dyn ApprovalGate>) -> Self {
        self.approval = approval;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn retry_controller(&self) -> Option<&RetryController> {
        self.retry.as_deref()
    }

    /// Execute one full pass over the tree. Dependency cycles abort before
    /// any node runs; every other failure is local to a node and its
    /// ancestry, and the pass always completes with a full report.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();

        DependencyGraph::from_registry(&self.registry).preflight()?;

        info!(
            total_tasks = self.registry.len(),
            root = %self.registry.root_id(),
            "starting task execution"
        );

        let outcome = self.execute_node(self.registry.root_id().to_string()).await;
        match &outcome {
            NodeOutcome::Completed => info!("run completed"),
            NodeOutcome::Blocked => warn!("root task blocked by dependencies"),
            NodeOutcome::GateRejected => warn!("root task rejected at human gate"),
            NodeOutcome::Failed { reason, .. } => error!(%reason, "run failed"),
        }

        let report = RunReport::capture(self.run_id.clone(), &self.registry, started_at).await;
        let summary = report.summary();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            blocked = summary.blocked,
            total = summary.total,
            "execution summary"
        );

        Ok(report)
    }

    /// Boxed recursion point: child execution re-enters the same protocol.
    fn execute_node(&self, task_id: String) -> BoxFuture<'static, NodeOutcome> {
        let scheduler = self.clone();
        async move { scheduler.run_node(&task_id).await }.boxed()
    }

    /// Per-node execution protocol. Re-entered from the top on retry.
    async fn run_node(&self, task_id: &str) -> NodeOutcome {
        let node = match self.registry.node(task_id) {
            Some(node) => node,
            None => {
                // Registry misuse rather than a configuration defect.
                let reason = EngineError::TaskNotFound {
                    task_id: task_id.to_string(),
                }
                .to_string();
                return NodeOutcome::Failed {
                    task_id: task_id.to_string(),
                    reason,
                };
            }
        };

        loop {
            // 1. Dependency gate: terminal for this pass, not a failure.
            if !dependency::is_ready(&self.registry, &node).await {
                self.registry.set_status(&node.id, TaskStatus::Blocked).await;
                warn!(path = %node.path, "task blocked by dependencies");
                return NodeOutcome::Blocked;
            }

            // 2. Human gate: a rejection ends the node without failing it.
            if node.human_gate {
                self.registry
                    .set_status(&node.id, TaskStatus::WaitingHuman)
                    .await;
                info!(path = %node.path, "waiting for human approval");

                match self.approval.review(&node).await {
                    GateDecision::Approve => {
                        debug!(path = %node.path, "gate approved");
                    }
                    GateDecision::Reject => {
                        warn!(path = %node.path, "gate rejected, stopping this branch");
                        return NodeOutcome::GateRejected;
                    }
                }
            }

            // 3. Running.
            self.registry.mark_started(&node.id).await;
            info!(path = %node.path, name = %node.name, "task started");

            // 4. Action under the timeout guard.
            let mut failure: Option<String> = None;
            if node.has_action() {
                let guard = self.timeout_guard;
                let executor = Arc::clone(&self.executor);
                let action_future = async {
                    executor
                        .execute(&node)
                        .await
                        .map_err(|err| EngineError::ActionFailed {
                            task_id: node.id.clone(),
                            message: format!("{err:#}"),
                        })
                };

                match guard.bound(&node.id, node.timeout, action_future).await {
                    Ok(payload) => self.registry.set_result(&node.id, payload).await,
                    Err(err) => failure = Some(err.to_string()),
                }
            }

            // 5. Children, regardless of whether an action ran.
            if failure.is_none() && node.has_children() {
                if let Err(err) = self.run_children(&node).await {
                    failure = Some(err.to_string());
                }
            }

            // 6. Success.
            let reason = match failure {
                None => {
                    self.registry.mark_completed(&node.id).await;
                    info!(path = %node.path, "task completed");
                    return NodeOutcome::Completed;
                }
                Some(reason) => reason,
            };

            // 7. Failure: consult the retry controller with the observed
            // outcome, never with the node's stored status.
            if let Some(retry) = &self.retry {
                if retry.eligible(&node.id, &AttemptOutcome::Failed) {
                    retry.record_attempt(&node.id);
                    let delay = retry.next_delay(&node.id);
                    warn!(
                        path = %node.path,
                        retry = retry.attempts(&node.id),
                        delay = ?delay,
                        %reason,
                        "retrying task"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    self.registry.reset_transient(&node.id).await;
                    continue;
                }
            }

            self.registry.mark_failed(&node.id, reason.clone()).await;
            error!(path = %node.path, %reason, "task failed");
            return NodeOutcome::Failed {
                task_id: node.id.clone(),
                reason,
            };
        }
    }

    async fn run_children(&self, node: &TaskNode) -> Result<()> {
        if node.parallel {
            self.run_parallel_children(node).await
        } else {
            self.run_sequential_children(node).await
        }
    }

    /// Sequential mode: strict input order, one at a time. An unrecovered
    /// child failure short-circuits; remaining siblings stay `Pending`.
    /// Blocked or gate-rejected children do not stop their siblings.
    async fn run_sequential_children(&self, node: &TaskNode) -> Result<()> {
        for child_id in &node.children {
            match self.execute_node(child_id.clone()).await {
                NodeOutcome::Failed { task_id, reason } => {
                    return Err(EngineError::ChildrenFailed {
                        task_id: node.id.clone(),
                        total: node.children.len(),
                        failures: vec![ChildFailure { task_id, reason }],
                    });
                }
                NodeOutcome::Completed | NodeOutcome::Blocked | NodeOutcome::GateRejected => {}
            }
        }
        Ok(())
    }

    /// Parallel mode: fork every child, then join all of them. Every child's
    /// outcome is collected; failures are aggregated so none is lost, and a
    /// worker that dies before reporting is itself recorded as a failure.
    async fn run_parallel_children(&self, node: &TaskNode) -> Result<()> {
        debug!(
            path = %node.path,
            children = node.children.len(),
            "forking parallel children"
        );

        let handles: Vec<_> = node
            .children
            .iter()
            .map(|child_id| {
                let future = self.execute_node(child_id.clone());
                (child_id.clone(), tokio::spawn(future))
            })
            .collect();

        let (child_ids, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(joins).await;

        let mut failures = Vec::new();
        for (child_id, result) in child_ids.into_iter().zip(results) {
            match result {
                Ok(NodeOutcome::Failed { task_id, reason }) => {
                    failures.push(ChildFailure { task_id, reason });
                }
                Ok(_) => {}
                Err(join_error) => {
                    let lost = EngineError::WorkerLost {
                        task_id: child_id.clone(),
                        message: join_error.to_string(),
                    };
                    error!(task_id = %child_id, %join_error, "child worker lost");
                    self.registry.mark_failed(&child_id, lost.to_string()).await;
                    failures.push(ChildFailure {
                        task_id: child_id,
                        reason: lost.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ChildrenFailed {
                task_id: node.id.clone(),
                total: node.children.len(),
                failures,
            })
        }
    }
}
