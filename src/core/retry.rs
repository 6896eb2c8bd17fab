//! Deadline and retry primitives.
//!
//! Two building blocks used across the stack: [`with_timeout`] races an
//! operation against a timer, and [`with_retry`] runs an operation under a
//! [`RetryPolicy`] with capped, jittered backoff between attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::core::error::{McpError, McpResult};

/// Delay schedule between retry attempts.
///
/// Attempts are numbered from 1. `exponential` doubles per attempt starting
/// at the base delay, `linear` grows by one base delay per attempt, and
/// `constant` always waits the base delay. The `Custom` arm accepts any
/// schedule as a function of attempt number and base delay.
#[derive(Clone)]
pub enum Backoff {
    /// Always the base delay
    Constant,
    /// base * attempt
    Linear,
    /// base * 2^(attempt - 1)
    Exponential,
    /// Caller-supplied schedule
    Custom(Arc<dyn Fn(u32, Duration) -> Duration + Send + Sync>),
}

impl Backoff {
    /// The raw delay for an attempt, before capping and jitter.
    pub fn delay(&self, attempt: u32, base: Duration) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Backoff::Constant => base,
            Backoff::Linear => base.saturating_mul(attempt),
            Backoff::Exponential => base.saturating_mul(1u32 << (attempt - 1).min(31)),
            Backoff::Custom(schedule) => schedule(attempt, base),
        }
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backoff::Constant => write!(f, "Constant"),
            Backoff::Linear => write!(f, "Linear"),
            Backoff::Exponential => write!(f, "Exponential"),
            Backoff::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay fed into the backoff schedule
    pub base_delay: Duration,
    /// Cap applied to every computed delay
    pub max_delay: Duration,
    /// Symmetric jitter as a fraction of the capped delay (0.0 to 1.0)
    pub jitter_fraction: f64,
    /// Delay schedule
    pub backoff: Backoff,
    /// Skip further attempts when the error is not recoverable
    pub respect_recoverability: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.1,
            backoff: Backoff::Exponential,
            respect_recoverability: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// The delay before the next attempt: backoff, capped, with symmetric
    /// uniform jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.backoff.delay(attempt, self.base_delay);
        let capped = raw.min(self.max_delay);

        if self.jitter_fraction <= 0.0 {
            return capped;
        }

        let jitter_range = capped.as_secs_f64() * self.jitter_fraction;
        let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_range;
        let adjusted = (capped.as_secs_f64() + jitter).max(0.0);
        Duration::from_secs_f64(adjusted)
    }
}

/// Race an operation against a deadline.
///
/// The losing side is dropped; if the timer wins, the result is
/// [`McpError::Timeout`] naming the operation.
pub async fn with_timeout<T, F>(operation_name: &str, duration: Duration, future: F) -> McpResult<T>
where
    F: Future<Output = McpResult<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(McpError::timeout(format!(
            "{operation_name} exceeded {duration:?}"
        ))),
    }
}

/// Run an operation up to `policy.max_attempts` times.
///
/// Sleeps the jittered backoff delay between attempts. When every attempt
/// has failed, the last error is wrapped as [`McpError::OperationFailed`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> McpResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = McpResult<T>>,
{
    let mut last_error: Option<McpError> = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("operation succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(error) => {
                let retryable = !policy.respect_recoverability || error.is_recoverable();
                last_error = Some(error);

                if !retryable || attempt >= policy.max_attempts {
                    break;
                }

                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    "attempt {attempt}/{} failed, retrying in {delay:?}",
                    policy.max_attempts
                );
                sleep(delay).await;
            }
        }
    }

    let inner = last_error.unwrap_or_else(|| McpError::internal("retry loop produced no error"));
    Err(McpError::OperationFailed(inner.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_schedules() {
        let base = Duration::from_millis(100);
        assert_eq!(Backoff::Constant.delay(1, base), base);
        assert_eq!(Backoff::Constant.delay(5, base), base);

        assert_eq!(Backoff::Linear.delay(1, base), Duration::from_millis(100));
        assert_eq!(Backoff::Linear.delay(3, base), Duration::from_millis(300));

        assert_eq!(
            Backoff::Exponential.delay(1, base),
            Duration::from_millis(100)
        );
        assert_eq!(
            Backoff::Exponential.delay(2, base),
            Duration::from_millis(200)
        );
        assert_eq!(
            Backoff::Exponential.delay(4, base),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn custom_backoff_is_honored() {
        let backoff = Backoff::Custom(Arc::new(|attempt, base| base.saturating_mul(attempt * 10)));
        assert_eq!(
            backoff.delay(2, Duration::from_millis(10)),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            jitter_fraction: 0.0,
            backoff: Backoff::Exponential,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            jitter_fraction: 0.25,
            backoff: Backoff::Constant,
            ..Default::default()
        };
        for _ in 0..100 {
            let delay = policy.delay_for_attempt(1).as_secs_f64();
            assert!((0.75..=1.25).contains(&delay), "delay out of bounds: {delay}");
        }
    }

    #[tokio::test]
    async fn with_timeout_passes_fast_operations() {
        let result = with_timeout("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn with_timeout_fails_slow_operations() {
        let result = with_timeout("slow", Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match result {
            Err(McpError::Timeout(message)) => assert!(message.contains("slow")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            jitter_fraction: 0.0,
            ..Default::default()
        };

        let result = with_retry(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(McpError::connection("flaky"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_wraps_final_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            jitter_fraction: 0.0,
            ..Default::default()
        };

        let result: McpResult<()> =
            with_retry(&policy, || async { Err(McpError::connection("down")) }).await;

        match result {
            Err(McpError::OperationFailed(message)) => assert!(message.contains("down")),
            other => panic!("expected operation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_stops_on_non_recoverable_errors() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let result: McpResult<()> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(McpError::InvalidParams("bad".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
