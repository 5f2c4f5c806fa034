//! Crawl session lifecycle and counters
//!
//! A session is written twice: once when the run starts (status `running`) and
//! once when it ends (`completed` or `error`) with the final counters.

use crate::catalog::Reconciliation;
use crate::storage::{ProductStore, SessionStatus, StorageError, StorageResult};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Aggregate counters for one crawl run
///
/// Owned by the pipeline that consumes extraction outcomes; there is no shared
/// mutable accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub urls_discovered: u64,
    pub products_processed: u64,
    pub products_added: u64,
    pub products_updated: u64,
    pub errors: u64,
    pub skipped: u64,
    /// Attempts beyond the first, over all candidates
    pub retries: u64,
    /// Attempts that hit the page timeout
    pub timeouts: u64,
}

impl CrawlStats {
    /// Adds the attempt counts of one finished candidate
    pub fn record_attempts(&mut self, attempts: u32, timeouts: u32) {
        self.retries += u64::from(attempts.saturating_sub(1));
        self.timeouts += u64::from(timeouts);
    }

    /// Counts a candidate whose extraction produced a record, by reconcile result
    pub fn record_reconciliation(&mut self, result: &Reconciliation) {
        self.products_processed += 1;
        match result {
            Reconciliation::Insert(_) => self.products_added += 1,
            Reconciliation::Update(..) => self.products_updated += 1,
            Reconciliation::Skip(_) => self.skipped += 1,
        }
    }

    /// Counts a candidate whose record could not be persisted
    pub fn record_persistence_error(&mut self) {
        self.products_processed += 1;
        self.errors += 1;
    }

    /// Counts a candidate that failed extraction
    pub fn record_failure(&mut self) {
        self.products_processed += 1;
        self.errors += 1;
    }

    /// Counts a candidate that was not a product page
    pub fn record_skip(&mut self) {
        self.products_processed += 1;
        self.skipped += 1;
    }
}

/// A running crawl session
///
/// Consumed by `finalize`, so a session cannot be finalized twice.
pub struct CrawlSession<S: ProductStore> {
    id: i64,
    store: Arc<Mutex<S>>,
    started: Instant,
}

impl<S: ProductStore> CrawlSession<S> {
    /// Creates the session row in the `running` state
    ///
    /// # Arguments
    ///
    /// * `store` - Shared catalog store
    /// * `config_hash` - Hash of the configuration the run was started with
    pub fn start(store: Arc<Mutex<S>>, config_hash: &str) -> StorageResult<Self> {
        let id = {
            let mut guard = lock_store(&store)?;
            guard.create_session(config_hash)?
        };
        tracing::info!("Started crawl session {}", id);

        Ok(Self {
            id,
            store,
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Marks the session as completed with its final counters
    pub fn complete(self, stats: &CrawlStats) -> StorageResult<()> {
        self.finalize(SessionStatus::Completed, stats, None)
    }

    /// Marks the session as failed, keeping the partial counters
    pub fn fail(self, stats: &CrawlStats, message: &str) -> StorageResult<()> {
        self.finalize(SessionStatus::Error, stats, Some(message))
    }

    fn finalize(
        self,
        status: SessionStatus,
        stats: &CrawlStats,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let elapsed = self.started.elapsed();
        {
            let mut guard = lock_store(&self.store)?;
            guard.finalize_session(self.id, status, stats, elapsed, error_message)?;
        }

        tracing::info!(
            "Session {} finalized as {} after {:.1}s: processed={} added={} updated={} errors={} skipped={} retries={} timeouts={}",
            self.id,
            status.to_db_string(),
            elapsed.as_secs_f64(),
            stats.products_processed,
            stats.products_added,
            stats.products_updated,
            stats.errors,
            stats.skipped,
            stats.retries,
            stats.timeouts
        );
        Ok(())
    }
}

/// Locks a shared store, mapping a poisoned mutex to a storage error
pub(crate) fn lock_store<S>(
    store: &Arc<Mutex<S>>,
) -> StorageResult<std::sync::MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|e| StorageError::Database(format!("Failed to lock store: {}", e)))
}
