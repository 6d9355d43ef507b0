// ABOUTME: Retry eligibility and backoff delay computation for failed nodes
// ABOUTME: Keeps per-id attempt counters; eligibility is a function of the observed outcome

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Maps a retry count to the delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Immediate,
    Exponential,
    Linear,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Bound on total attempts, the first run included. `max_attempts = 3`
    /// means one initial attempt plus at most two retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_strategy")]
    pub strategy: BackoffStrategy,
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_strategy() -> BackoffStrategy {
    BackoffStrategy::Exponential
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: default_strategy(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: BackoffStrategy::Fixed,
            base_delay: delay,
            max_delay: delay,
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            strategy: BackoffStrategy::Immediate,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: BackoffStrategy::Exponential,
            base_delay,
            max_delay,
        }
    }
}

/// The outcome of the attempt that just finished. Callers pass this in
/// explicitly; eligibility is never inferred from a node's stored status,
/// which may not have been written yet when the controller is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

impl AttemptOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, AttemptOutcome::Failed)
    }
}

/// Decides whether a failed node gets another attempt and how long to wait
/// before it. Counters are keyed by node id and shared across workers.
pub struct RetryController {
    policy: RetryPolicy,
    retry_counts: Mutex<HashMap<String, u32>>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of retries recorded for this id so far.
    pub fn attempts(&self, task_id: &str) -> u32 {
        let counts = self.retry_counts.lock().expect("retry counter lock");
        counts.get(task_id).copied().unwrap_or(0)
    }

    /// True iff the attempt just failed and the total attempt budget
    /// (initial attempt + recorded retries) still has room for another run.
    pub fn eligible(&self, task_id: &str, outcome: &AttemptOutcome) -> bool {
        if !outcome.is_failure() {
            return false;
        }
        // attempts made so far = recorded retries + the initial attempt
        self.attempts(task_id) + 1 < self.policy.max_attempts
    }

    /// Delay before the next attempt, given the retries recorded so far.
    pub fn next_delay(&self, task_id: &str) -> Duration {
        let attempt = self.attempts(task_id);

        let delay = match self.policy.strategy {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                self.policy
                    .base_delay
                    .checked_mul(factor)
                    .unwrap_or(self.policy.max_delay)
            }
            BackoffStrategy::Linear => self
                .policy
                .base_delay
                .checked_mul(attempt + 1)
                .unwrap_or(self.policy.max_delay),
            BackoffStrategy::Fixed => self.policy.base_delay,
        };

        delay.min(self.policy.max_delay)
    }

    /// Record one retry initiation. Must be called exactly once before the
    /// node is re-run so attempts stay monotonically bounded.
    pub fn record_attempt(&self, task_id: &str) {
        let mut counts = self.retry_counts.lock().expect("retry counter lock");
        *counts.entry(task_id.to_string()).or_insert(0) += 1;
    }

    /// Clear the counter for one id, for a fresh run of the same tree.
    pub fn reset(&self, task_id: &str) {
        let mut counts = self.retry_counts.lock().expect("retry counter lock");
        counts.remove(task_id);
    }

    pub fn reset_all(&self) {
        let mut counts = self.retry_counts.lock().expect("retry counter lock");
        counts.clear();
    }
}
