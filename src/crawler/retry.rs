//! Retry policy shared by sitemap fetches and page navigations
//!
//! Attempt N that fails waits `N * base_delay` before attempt N+1 runs.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed attempt count with linearly growing delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay unit between attempts
    pub base_delay: Duration,
}

/// Final result of a retried operation and how many attempts it took
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy; at least one attempt is always made
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Creates a policy from a retry count (first attempt not included)
    pub fn with_retries(max_retries: u32, base_delay: Duration) -> Self {
        Self::new(max_retries.saturating_add(1), base_delay)
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// # Arguments
    ///
    /// * `label` - What is being attempted, for log lines
    /// * `op` - Produces one attempt; receives the 1-based attempt number
    /// * `is_transient` - Whether an error is worth another attempt
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        is_transient: P,
    ) -> Retried<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) => {
                    if attempt >= self.max_attempts || !is_transient(&err) {
                        return Retried {
                            result: Err(err),
                            attempts: attempt,
                        };
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Runs a future with a deadline, mapping expiry to the caller's error
///
/// # Returns
///
/// * `Ok(T)` - The operation finished in time and succeeded
/// * `Err(E)` - The operation failed, or `on_timeout()` if the deadline passed
pub async fn with_timeout<F, T, E>(
    limit: Duration,
    operation: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
