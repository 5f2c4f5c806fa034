//! Crawl coordinator - main pipeline orchestration
//!
//! A run goes through these stages:
//! - Open the catalog store and start a session
//! - Discover candidates from the configured sitemaps
//! - Apply the offset/limit window
//! - Extract candidates through the scheduler
//! - Reconcile each extracted record into the catalog
//! - Finalize the session with the run's counters

use crate::catalog::Reconciler;
use crate::config::Config;
use crate::crawler::scheduler::{
    ExtractionScheduler, Outcome, SchedulerSummary, StopSignal, TaskOutcome,
};
use crate::session::{CrawlSession, CrawlStats};
use crate::sitemap::{DiscoveryReport, SitemapResolver};
use crate::storage::{open_store, ProductStore, SqliteStore};
use crate::CrawlError;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// What a finished run reports back
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub session_id: i64,
    pub stats: CrawlStats,
    pub scheduler: SchedulerSummary,
    pub elapsed: Duration,
}

/// Discovery, extraction and reconciliation wired together
pub struct Pipeline<S: ProductStore> {
    config: Config,
    store: Arc<Mutex<S>>,
    resolver: SitemapResolver,
    scheduler: ExtractionScheduler,
}

impl Pipeline<SqliteStore> {
    /// Builds the shipped pipeline: SQLite store, HTTP sitemap resolver,
    /// HTTP renderer and microdata extractor
    ///
    /// # Returns
    ///
    /// * `Ok(Pipeline)` - Ready to run
    /// * `Err(CrawlError)` - The store could not be opened or the HTTP client built
    pub fn from_config(config: Config) -> Result<Self, CrawlError> {
        let store = open_store(Path::new(&config.catalog.database_path))?;
        let resolver = SitemapResolver::from_config(&config)?;
        let scheduler = ExtractionScheduler::from_config(&config);

        Ok(Self::new(
            config,
            Arc::new(Mutex::new(store)),
            resolver,
            scheduler,
        ))
    }
}

impl<S: ProductStore> Pipeline<S> {
    pub fn new(
        config: Config,
        store: Arc<Mutex<S>>,
        resolver: SitemapResolver,
        scheduler: ExtractionScheduler,
    ) -> Self {
        Self {
            config,
            store,
            resolver,
            scheduler,
        }
    }

    /// Handle for stopping the run between batches
    pub fn stop_signal(&self) -> StopSignal {
        self.scheduler.stop_signal()
    }

    /// Runs discovery only and returns the windowed candidate list
    pub async fn discover(&self) -> (DiscoveryReport, Vec<String>) {
        let report = self.resolver.discover(&self.config.sitemaps.roots).await;
        let window = apply_window(
            &report.candidates,
            self.config.discovery.offset,
            self.config.discovery.limit,
        );
        (report, window)
    }

    /// Runs the whole pipeline inside a crawl session
    ///
    /// The session is finalized as `completed` when every batch ran or a stop
    /// was requested, and as `error` otherwise; the error is still returned.
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration, recorded on the session
    pub async fn run(self, config_hash: &str) -> Result<CrawlReport, CrawlError> {
        let session = CrawlSession::start(Arc::clone(&self.store), config_hash)?;
        let session_id = session.id();
        let mut stats = CrawlStats::default();

        match self.execute(&mut stats).await {
            Ok(summary) => {
                let elapsed = session.elapsed();
                session.complete(&stats)?;
                if summary.stopped {
                    tracing::warn!("Run stopped early; session {} kept partial counters", session_id);
                }
                Ok(CrawlReport {
                    session_id,
                    stats,
                    scheduler: summary,
                    elapsed,
                })
            }
            Err(e) => {
                tracing::error!("Crawl session {} aborted: {}", session_id, e);
                if let Err(finalize_err) = session.fail(&stats, &e.to_string()) {
                    tracing::error!(
                        "Failed to record error state for session {}: {}",
                        session_id,
                        finalize_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(self, stats: &mut CrawlStats) -> Result<SchedulerSummary, CrawlError> {
        let (report, candidates) = self.discover().await;
        stats.urls_discovered = candidates.len() as u64;

        if candidates.len() < report.candidates.len() {
            tracing::info!(
                "Processing window of {} candidates (offset {}, {} discovered)",
                candidates.len(),
                self.config.discovery.offset,
                report.candidates.len()
            );
        }

        let reconciler = Reconciler::new(Arc::clone(&self.store));
        let progress = ProgressReporter::new(
            candidates.len() as u64,
            self.config.crawler.progress_interval,
        );

        let (rx, handle) = self.scheduler.run(candidates);
        consume_outcomes(rx, &reconciler, stats, progress).await;

        handle
            .await
            .map_err(|e| CrawlError::Task(e.to_string()))?
    }
}

/// Folds scheduler outcomes into the catalog and the run counters
///
/// Persistence failures are counted and logged; they never stop the run.
async fn consume_outcomes<S: ProductStore>(
    mut rx: mpsc::Receiver<TaskOutcome>,
    reconciler: &Reconciler<S>,
    stats: &mut CrawlStats,
    progress: ProgressReporter,
) {
    while let Some(task) = rx.recv().await {
        stats.record_attempts(task.attempts, task.timeouts);
        match task.outcome {
            Outcome::Success(record) => match reconciler.reconcile(&record) {
                Ok(result) => {
                    tracing::debug!("Reconciled {}: {:?}", task.url, result.product().map(|p| p.id));
                    stats.record_reconciliation(&result);
                }
                Err(e) => {
                    tracing::warn!("Failed to persist {}: {}", task.url, e);
                    stats.record_persistence_error();
                }
            },
            Outcome::Skipped(reason) => {
                tracing::debug!("Skipped {}: {}", task.url, reason);
                stats.record_skip();
            }
            Outcome::Failure(class) => {
                tracing::debug!(
                    "Failed {} after {} attempts ({})",
                    task.url,
                    task.attempts,
                    class
                );
                stats.record_failure();
            }
        }

        progress.tick(stats);
    }
}

/// Selects `limit` candidates starting at `offset`
pub fn apply_window(candidates: &[String], offset: usize, limit: Option<usize>) -> Vec<String> {
    candidates
        .iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Point-in-time progress numbers
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    /// Candidates per second
    pub rate: f64,
    /// Time left at the current rate, once a rate is known
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn compute(processed: u64, total: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { processed as f64 / secs } else { 0.0 };
        let eta = (rate > 0.0)
            .then(|| Duration::from_secs_f64(total.saturating_sub(processed) as f64 / rate));

        Self {
            processed,
            total,
            rate,
            eta,
        }
    }
}

/// Logs a progress line every `interval` processed candidates
struct ProgressReporter {
    started: Instant,
    total: u64,
    interval: u64,
}

impl ProgressReporter {
    fn new(total: u64, interval: u64) -> Self {
        Self {
            started: Instant::now(),
            total,
            interval: interval.max(1),
        }
    }

    fn tick(&self, stats: &CrawlStats) {
        let processed = stats.products_processed;
        if processed == 0 || processed % self.interval != 0 {
            return;
        }

        let snapshot = ProgressSnapshot::compute(processed, self.total, self.started.elapsed());
        tracing::info!(
            "Progress: {}/{} processed ({} added, {} updated, {} errors, {} skipped), {:.2}/s, ETA {}",
            snapshot.processed,
            snapshot.total,
            stats.products_added,
            stats.products_updated,
            stats.errors,
            stats.skipped,
            snapshot.rate,
            snapshot
                .eta
                .map(|eta| format!("{}s", eta.as_secs()))
                .unwrap_or_else(|| "unknown".to_string())
        );
    }
}

/// Waits for interrupts on behalf of a running crawl
///
/// The first interrupt requests a cooperative stop. Returns `true` when a second
/// one arrives while the current batch is still draining, and `false` if the
/// signal source fails.
async fn watch_interrupts<F, Fut>(stop: StopSignal, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        tracing::warn!("Cannot listen for interrupts: {}", e);
        return false;
    }
    tracing::warn!("Interrupt received; finishing the current batch (interrupt again to exit now)");
    stop.stop();

    next_interrupt().await.is_ok()
}

/// Runs a complete crawl with the shipped components
///
/// Ctrl-C requests a cooperative stop; the current batch finishes and the
/// session is finalized as completed. A second Ctrl-C exits immediately and
/// leaves the session in the running state.
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Hash of the configuration file
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run finished or was stopped
/// * `Err(CrawlError)` - The run could not start or was aborted
pub async fn run_crawl(config: Config, config_hash: &str) -> Result<CrawlReport, CrawlError> {
    let pipeline = Pipeline::from_config(config)?;

    let stop = pipeline.stop_signal();
    let interrupt = tokio::spawn(async move {
        if watch_interrupts(stop, tokio::signal::ctrl_c).await {
            tracing::error!("Second interrupt; exiting without finalizing the session");
            std::process::exit(130);
        }
    });

    let result = pipeline.run(config_hash).await;
    interrupt.abort();

    if let Ok(report) = &result {
        tracing::info!(
            "Crawl finished in {:.1}s: {} discovered, {} processed, {} added, {} updated, {} errors, {} skipped ({} retries, {} timeouts)",
            report.elapsed.as_secs_f64(),
            report.stats.urls_discovered,
            report.stats.products_processed,
            report.stats.products_added,
            report.stats.products_updated,
            report.stats.errors,
            report.stats.skipped,
            report.scheduler.retries,
            report.scheduler.timeouts
        );
    }

    result
}
