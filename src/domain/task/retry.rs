//! Task-level retry
//!
//! Runs one capability up to `max_attempts` times, branching on the outcome
//! tag: success returns, fatal stops, recoverable (or an unexpected error)
//! sleeps a random pause and tries again.

use super::model::TaskOutcome;
use super::registry::{Capability, WalletContext};
use crate::config::{PauseRange, SettingsConfig};

/// How often and how patiently a task is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub pause: PauseRange,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, pause: PauseRange) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            pause,
        }
    }

    pub fn from_settings(settings: &SettingsConfig) -> Self {
        Self::new(settings.task_attempts, settings.pause_between_attempts)
    }

    /// Single attempt, no pause
    pub fn once() -> Self {
        Self::new(1, PauseRange::ZERO)
    }
}

/// Last outcome and the attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub outcome: TaskOutcome,
    pub attempts: u32,
}

/// Execute `capability` under `policy`
pub async fn attempt(capability: &dyn Capability, ctx: &WalletContext, policy: &RetryPolicy) -> AttemptReport {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let outcome = match capability.execute(ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(account = ctx.account_index, attempt = attempts, error = %e, "Task raised an error");
                TaskOutcome::Recoverable(e.to_string())
            }
        };

        match outcome {
            TaskOutcome::Success | TaskOutcome::Fatal(_) => {
                return AttemptReport { outcome, attempts };
            }
            TaskOutcome::Recoverable(_) if attempts >= max_attempts => {
                return AttemptReport { outcome, attempts };
            }
            TaskOutcome::Recoverable(ref reason) => {
                let pause = policy.pause.sample_now();
                tracing::info!(
                    account = ctx.account_index,
                    attempt = attempts,
                    max_attempts,
                    reason = %reason,
                    "Pausing {}s before next attempt",
                    pause.as_secs()
                );
                tokio::time::sleep(pause).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::registry::test_support;
    use crate::error::CapabilityError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed sequence of results
    struct Scripted {
        script: Mutex<Vec<Result<TaskOutcome, CapabilityError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut script: Vec<Result<TaskOutcome, CapabilityError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Capability for Scripted {
        async fn execute(&self, _ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(TaskOutcome::recoverable("exhausted")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let cap = Scripted::new(vec![Ok(TaskOutcome::Success)]);
        let ctx = test_support::context(1, "k");
        let report = attempt(&cap, &ctx, &RetryPolicy::new(3, PauseRange::new(1, 1))).await;
        assert_eq!(report, AttemptReport { outcome: TaskOutcome::Success, attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_then_success_pauses_between() {
        let cap = Scripted::new(vec![
            Ok(TaskOutcome::recoverable("not yet")),
            Err(CapabilityError::Other("boom".into())),
            Ok(TaskOutcome::Success),
        ]);
        let ctx = test_support::context(1, "k");
        let started = tokio::time::Instant::now();

        let report = attempt(&cap, &ctx, &RetryPolicy::new(3, PauseRange::new(5, 5))).await;

        assert_eq!(report.outcome, TaskOutcome::Success);
        assert_eq!(report.attempts, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_outcome_without_trailing_pause() {
        let cap = Scripted::new(vec![
            Ok(TaskOutcome::recoverable("first")),
            Ok(TaskOutcome::recoverable("second")),
        ]);
        let ctx = test_support::context(1, "k");
        let started = tokio::time::Instant::now();

        let report = attempt(&cap, &ctx, &RetryPolicy::new(2, PauseRange::new(3, 3))).await;

        assert_eq!(report.outcome, TaskOutcome::recoverable("second"));
        assert_eq!(cap.calls(), 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_immediately() {
        let cap = Scripted::new(vec![Ok(TaskOutcome::fatal("banned"))]);
        let ctx = test_support::context(1, "k");
        let report = attempt(&cap, &ctx, &RetryPolicy::new(5, PauseRange::new(1, 1))).await;
        assert!(report.outcome.is_fatal());
        assert_eq!(cap.calls(), 1);
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = SettingsConfig::default();
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(RetryPolicy::new(0, PauseRange::ZERO).max_attempts, 1);
    }
}
