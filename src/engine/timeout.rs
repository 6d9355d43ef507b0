// ABOUTME: Wall-clock bound on a single action invocation
// ABOUTME: Wraps the action future in a countdown and abandons it on expiry

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::error;

use super::error::{EngineError, Result};

/// Bounds one action call. A per-node override wins over the engine default;
/// a zero or missing value means no bound at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutGuard {
    default_timeout: Option<Duration>,
}

impl TimeoutGuard {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }

    /// The timeout that applies to a node, normalized so that zero means
    /// "no timeout".
    pub fn effective(&self, node_timeout: Option<Duration>) -> Option<Duration> {
        node_timeout
            .or(self.default_timeout)
            .filter(|t| !t.is_zero())
    }

    /// Run `future` under the effective timeout. On expiry the future is
    /// dropped (best-effort abandonment; the underlying work may keep
    /// running but its result is discarded) and a timeout failure is
    /// returned. Without an effective timeout this is a pass-through.
    pub async fn bound<F, T>(
        &self,
        task_id: &str,
        node_timeout: Option<Duration>,
        future: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.effective(node_timeout) {
            Some(limit) => match timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => {
                    error!(task_id = %task_id, timeout = ?limit, "action timed out");
                    Err(EngineError::ActionTimeout {
                        task_id: task_id.to_string(),
                        timeout: limit,
                    })
                }
            },
            None => future.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_effective_prefers_node_override() {
        let guard = TimeoutGuard::new(Some(Duration::from_secs(30)));
        assert_eq!(
            guard.effective(Some(Duration::from_secs(5))),
            Some(Duration::from_secs(5))
        );
        assert_eq!(guard.effective(None), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_means_no_timeout() {
        let guard = TimeoutGuard::new(None);
        assert_eq!(guard.effective(Some(Duration::ZERO)), None);
        assert_eq!(guard.effective(None), None);

        let guard = TimeoutGuard::new(Some(Duration::ZERO));
        assert_eq!(guard.effective(None), None);
    }

    #[tokio::test]
    async fn test_fast_action_is_unaffected() {
        let guard = TimeoutGuard::new(Some(Duration::from_secs(5)));
        let result = guard
            .bound("fast", None, async { Ok::<_, EngineError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_slow_action_times_out() {
        let guard = TimeoutGuard::new(None);
        let result = guard
            .bound("slow", Some(Duration::from_millis(20)), async {
                sleep(Duration::from_secs(10)).await;
                Ok::<_, EngineError>(())
            })
            .await;

        match result {
            Err(EngineError::ActionTimeout { task_id, timeout }) => {
                assert_eq!(task_id, "slow");
                assert_eq!(timeout, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_no_timeout_passes_through() {
        let guard = TimeoutGuard::new(None);
        let result = guard
            .bound("unbounded", None, async {
                sleep(Duration::from_millis(10)).await;
                Ok::<_, EngineError>("done")
            })
            .await;
        assert_eq!(result.unwrap(), "done");
    }
}
