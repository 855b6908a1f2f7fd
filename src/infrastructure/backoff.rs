//! Request-level retry with exponential backoff
//!
//! Independent from task-level attempts: integrations wrap individual
//! outbound requests with this, the account runner wraps whole tasks with
//! [`crate::domain::task::retry`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry configuration for one outbound request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, at least 1
    pub attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Multiplier applied after every failed attempt
    pub backoff_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        self.base_delay.mul_f64(self.backoff_factor.max(1.0).powi(exponent))
    }
}

/// Run `op` until it succeeds or `policy.attempts` are used up.
///
/// Returns the last error when every attempt fails. No sleep follows the
/// final attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(label: &str, policy: BackoffPolicy, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    request = label,
                    attempt,
                    attempts,
                    error = %e,
                    "Request failed, retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(request = label, attempts, error = %e, "All request attempts failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = tokio::time::Instant::now();

        let result: Result<u32, String> = retry_with_backoff("test", BackoffPolicy::default(), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("fail {}", n))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        // 1s + 2s of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> =
            retry_with_backoff("test", BackoffPolicy::with_attempts(2), move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("fail {}", n))
            })
            .await;

        assert_eq!(result, Err("fail 2".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
