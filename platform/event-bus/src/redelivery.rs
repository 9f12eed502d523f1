//! Redelivery policy with exponential backoff
//!
//! Consumer groups negatively acknowledge failed deliveries with a delay taken
//! from [`RedeliveryPolicy::backoff_for`]. Once [`RedeliveryPolicy::exhausted`]
//! reports true the consumer dead-letters the message instead.
//!
//! [`retry_with_backoff`] applies the same schedule in-process, for calls
//! that have no broker behind them to drive redelivery.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for redelivery behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RedeliveryPolicy {
    /// Deliveries before the message is dead-lettered (0 = unbounded)
    pub max_deliver: u32,
    /// Delay before the first redelivery (doubles on each one)
    pub initial_backoff: Duration,
    /// Cap on the exponential growth
    pub max_backoff: Duration,
    /// How long a handler may hold a delivery before it counts as failed
    pub ack_wait: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_deliver: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            ack_wait: Duration::from_secs(30),
        }
    }
}

impl RedeliveryPolicy {
    /// Delay before redelivering a message that just failed on `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Whether a failure on `attempt` should dead-letter rather than retry.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_deliver > 0 && attempt >= self.max_deliver
    }
}

/// Retry a fallible async operation with exponential backoff
///
/// # Arguments
/// * `operation` - The async operation to retry
/// * `policy` - `max_deliver` bounds the number of attempts
/// * `context` - Context string for logging (e.g., "publish_dead_letter")
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    policy: &RedeliveryPolicy,
    context: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Send,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        context = %context,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if policy.exhausted(attempt) {
                    warn!(
                        context = %context,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let backoff = policy.backoff_for(attempt);
                warn!(
                    context = %context,
                    attempt = attempt,
                    max_attempts = policy.max_deliver,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Operation failed, retrying with backoff"
                );

                sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fast_policy(max_deliver: u32) -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_deliver,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            ack_wait: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = fast_policy(10);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(40));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(50));
    }

    #[test]
    fn test_exhausted() {
        let policy = fast_policy(3);
        assert!(!policy.exhausted(1));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));

        let unbounded = fast_policy(0);
        assert!(!unbounded.exhausted(1_000));
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_with_backoff(
            || async { Ok::<_, String>(42) },
            &fast_policy(3),
            "test_operation",
        )
        .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff(
            || {
                let attempts = attempts_clone.clone();
                async move {
                    let mut count = attempts.lock().unwrap();
                    *count += 1;
                    if *count < 3 {
                        Err(format!("Attempt {}", *count))
                    } else {
                        Ok(42)
                    }
                }
            },
            &fast_policy(3),
            "test_operation",
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_attempts() {
        let result = retry_with_backoff(
            || async { Err::<i32, _>("persistent error") },
            &fast_policy(2),
            "test_operation",
        )
        .await;

        assert_eq!(result, Err("persistent error"));
    }

    #[tokio::test]
    async fn test_exponential_backoff_elapsed() {
        let start = std::time::Instant::now();

        let _ = retry_with_backoff(
            || async { Err::<i32, _>("error") },
            &fast_policy(4),
            "test_operation",
        )
        .await;

        // 10ms + 20ms + 40ms between four attempts
        assert!(start.elapsed() >= Duration::from_millis(70));
    }
}
