// Retry logic with exponential backoff
// Author: kelexine (https://github.com/kelexine)

use crate::error::Result;
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget and backoff base for one retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Retry `n` (after failed attempt `n`) waits `base * 2^n`.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }
}

/// Create exponential backoff configuration for retries.
///
/// No jitter and no elapsed-time cap: the attempt budget is the only limit.
pub fn create_backoff(base: Duration) -> ExponentialBackoff {
    let first = base * 2;
    ExponentialBackoff {
        current_interval: first,
        initial_interval: first,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: Duration::from_secs(30),
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Execute `operation` until it succeeds, fails with a non-retryable error,
/// or the attempt budget is spent. The operation receives the 1-based
/// attempt number. The last error is returned when attempts run out.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = create_backoff(policy.backoff_base);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt >= policy.max_attempts {
                    warn!(
                        "{} failed on attempt {}/{}, giving up: {}",
                        operation_name, attempt, policy.max_attempts, err
                    );
                    return Err(err);
                }

                let delay = backoff
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_secs(30));
                warn!(
                    "{} failed on attempt {}/{}, retrying after {}ms: {}",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    delay.as_millis(),
                    err
                );

                // Wait before retry
                tokio::time::sleep(delay).await;
            }
        }
    }
}
