//! Consecutive-failure circuit breaker
//!
//! Shared by every extraction task of a run. Any success or skip closes the
//! streak; once the streak exceeds the threshold the breaker stays open for the
//! rest of the run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Circuit breaker over the whole run
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    threshold: u32,
    open: AtomicBool,
}

impl CircuitBreaker {
    /// Create a breaker that opens after more than `threshold` consecutive failures
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            threshold,
            open: AtomicBool::new(false),
        }
    }

    /// Record a failed task
    ///
    /// Returns true if this failure opened the breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures > self.threshold && !self.open.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                "Circuit breaker OPEN after {} consecutive failures (threshold {})",
                failures,
                self.threshold
            );
            return true;
        }
        false
    }

    /// Record a task that did not fail
    pub fn record_success(&self) {
        if !self.is_open() {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
