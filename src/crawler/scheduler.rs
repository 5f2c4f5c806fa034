//! Batched, bounded-concurrency extraction of candidate pages
//!
//! This module handles:
//! - Splitting candidates into batches that run one after another
//! - Limiting tasks in flight within a batch via a semaphore
//! - Retrying transient navigation failures
//! - Tripping the run-wide circuit breaker on consecutive failures
//! - Cooperative stop between batches
//!
//! Outcomes are streamed to the caller over a channel as tasks finish.

use crate::catalog::ProductRecord;
use crate::config::Config;
use crate::crawler::circuit::CircuitBreaker;
use crate::crawler::extractor::{ExtractionError, FieldExtractor, MicrodataExtractor};
use crate::crawler::renderer::{HttpRenderer, PageRenderer, RenderContext, RenderError};
use crate::crawler::retry::RetryPolicy;
use crate::CrawlError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Why a candidate failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    Navigation,
    Http(u16),
    Context,
    Extraction,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Navigation => write!(f, "navigation"),
            Self::Http(status) => write!(f, "http {}", status),
            Self::Context => write!(f, "context"),
            Self::Extraction => write!(f, "extraction"),
        }
    }
}

/// Result of extracting one candidate
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(ProductRecord),
    Skipped(String),
    Failure(FailureClass),
}

/// An outcome together with the candidate it belongs to
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub url: String,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Attempts that hit the page timeout
    pub timeouts: u32,
    pub outcome: Outcome,
}

/// Scheduling parameters
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub concurrency: usize,
    pub batch_size: usize,
    pub page_timeout: Duration,
    pub settle_time: Duration,
    pub retry: RetryPolicy,
    pub batch_delay: Duration,
    pub circuit_breaker_threshold: u32,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        let crawler = &config.crawler;
        Self {
            concurrency: crawler.concurrency.max(1) as usize,
            batch_size: crawler.batch_size.max(1) as usize,
            page_timeout: crawler.page_timeout(),
            settle_time: crawler.settle_time(),
            retry: RetryPolicy::with_retries(
                crawler.max_retries,
                Duration::from_millis(crawler.retry_delay_ms),
            ),
            batch_delay: crawler.batch_delay(),
            circuit_breaker_threshold: crawler.circuit_breaker_threshold,
        }
    }
}

/// Cooperative stop request, checked between batches
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Totals reported when a run ends normally
///
/// The same counts travel on each `TaskOutcome`, so a consumer still has them
/// when the run is aborted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Candidates whose task ran to an outcome
    pub attempted: u64,
    pub batches: u64,
    /// Attempts beyond the first, over all tasks
    pub retries: u64,
    /// Navigation attempts that hit the page timeout
    pub timeouts: u64,
    /// Whether the run ended early on a stop request
    pub stopped: bool,
}

/// Error from a single extraction attempt
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Render(e) => e.is_transient(),
            Self::Extraction(_) => false,
        }
    }

    fn class(&self) -> FailureClass {
        match self {
            Self::Render(RenderError::Timeout { .. }) => FailureClass::Timeout,
            Self::Render(RenderError::Navigation { .. }) => FailureClass::Navigation,
            Self::Render(RenderError::Http { status, .. }) => FailureClass::Http(*status),
            Self::Render(RenderError::Context(_)) => FailureClass::Context,
            Self::Extraction(_) => FailureClass::Extraction,
        }
    }
}

/// Schedules extraction tasks over a list of candidate URLs
pub struct ExtractionScheduler {
    renderer: Arc<dyn PageRenderer>,
    extractor: Arc<dyn FieldExtractor>,
    settings: SchedulerSettings,
    stop: StopSignal,
}

impl ExtractionScheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    ///
    /// * `renderer` - Shared renderer; each task opens its own context
    /// * `extractor` - Turns rendered pages into product records
    /// * `settings` - Batch, concurrency, timeout and retry parameters
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        extractor: Arc<dyn FieldExtractor>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            renderer,
            extractor,
            settings,
            stop: StopSignal::new(),
        }
    }

    /// Builds a scheduler with the shipped HTTP renderer and microdata extractor
    pub fn from_config(config: &Config) -> Self {
        if !config.crawler.headless {
            tracing::debug!("HTTP renderer has no window; ignoring headless = false");
        }
        Self::new(
            Arc::new(HttpRenderer::new(config.crawler.user_agent.clone())),
            Arc::new(MicrodataExtractor::new(
                config.catalog.default_currency.clone(),
            )),
            SchedulerSettings::from(config),
        )
    }

    /// Handle for requesting a stop from outside the run
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Starts the run in a background task
    ///
    /// # Returns
    ///
    /// A receiver yielding one `TaskOutcome` per finished task, and a handle that
    /// resolves once the receiver has seen every outcome:
    /// * `Ok(SchedulerSummary)` - Every batch ran, or a stop was requested
    /// * `Err(CrawlError::CircuitOpen)` - Too many consecutive failures
    pub fn run(
        self,
        candidates: Vec<String>,
    ) -> (
        mpsc::Receiver<TaskOutcome>,
        JoinHandle<Result<SchedulerSummary, CrawlError>>,
    ) {
        let (tx, rx) = mpsc::channel(self.settings.batch_size.max(1) * 2);
        let handle = tokio::spawn(self.drive(candidates, tx));
        (rx, handle)
    }

    async fn drive(
        self,
        candidates: Vec<String>,
        tx: mpsc::Sender<TaskOutcome>,
    ) -> Result<SchedulerSummary, CrawlError> {
        let settings = &self.settings;
        let breaker = Arc::new(CircuitBreaker::new(settings.circuit_breaker_threshold));
        let runner = Arc::new(TaskRunner {
            renderer: Arc::clone(&self.renderer),
            extractor: Arc::clone(&self.extractor),
            page_timeout: settings.page_timeout,
            settle_time: settings.settle_time,
            retry: settings.retry,
            breaker: Arc::clone(&breaker),
        });

        let mut summary = SchedulerSummary::default();
        let batch_count = candidates.len().div_ceil(settings.batch_size);

        tracing::info!(
            "Scheduling {} candidates in {} batches (concurrency {})",
            candidates.len(),
            batch_count,
            settings.concurrency
        );

        for (index, batch) in candidates.chunks(settings.batch_size).enumerate() {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested; {} batches not started", batch_count - index);
                summary.stopped = true;
                break;
            }

            tracing::debug!("Starting batch {}/{}", index + 1, batch_count);
            summary.batches += 1;

            let semaphore = Arc::new(Semaphore::new(settings.concurrency));
            let mut tasks = JoinSet::new();

            for url in batch {
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| CrawlError::Task(e.to_string()))?;
                if breaker.is_open() {
                    break;
                }

                let runner = Arc::clone(&runner);
                let url = url.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    runner.process(url).await
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let outcome = joined.map_err(|e| CrawlError::Task(e.to_string()))?;
                summary.attempted += 1;
                summary.retries += u64::from(outcome.attempts.saturating_sub(1));
                summary.timeouts += u64::from(outcome.timeouts);

                if tx.send(outcome).await.is_err() {
                    tracing::debug!("Outcome receiver dropped; stopping after this batch");
                    self.stop.stop();
                }
            }

            if breaker.is_open() {
                return Err(CrawlError::CircuitOpen {
                    consecutive_failures: breaker.consecutive_failures(),
                    threshold: breaker.threshold(),
                });
            }

            let is_last = index + 1 == batch_count;
            if !is_last && !settings.batch_delay.is_zero() && !self.stop.is_stopped() {
                tokio::time::sleep(settings.batch_delay).await;
            }
        }

        Ok(summary)
    }
}

/// State shared by the tasks of one run
struct TaskRunner {
    renderer: Arc<dyn PageRenderer>,
    extractor: Arc<dyn FieldExtractor>,
    page_timeout: Duration,
    settle_time: Duration,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl TaskRunner {
    async fn process(&self, url: String) -> TaskOutcome {
        let target = url.as_str();
        let timeouts = AtomicU32::new(0);
        let retried = self
            .retry
            .run(
                &format!("Extraction of {}", target),
                |_| self.attempt(target, &timeouts),
                AttemptError::is_transient,
            )
            .await;

        let outcome = match retried.result {
            Ok(Some(record)) => Outcome::Success(record),
            Ok(None) => Outcome::Skipped("not a product page".to_string()),
            Err(AttemptError::Extraction(ExtractionError::NotReady(reason))) => {
                Outcome::Skipped(reason)
            }
            Err(e) => {
                tracing::warn!("Extraction of {} failed: {}", url, e);
                Outcome::Failure(e.class())
            }
        };

        match &outcome {
            Outcome::Failure(_) => {
                self.breaker.record_failure();
            }
            _ => self.breaker.record_success(),
        }

        tracing::debug!("{} -> {:?} after {} attempts", url, outcome, retried.attempts);

        TaskOutcome {
            url,
            attempts: retried.attempts,
            timeouts: timeouts.into_inner(),
            outcome,
        }
    }

    /// One attempt in a fresh context; the context is closed on every path
    async fn attempt(
        &self,
        url: &str,
        timeouts: &AtomicU32,
    ) -> Result<Option<ProductRecord>, AttemptError> {
        let mut context = self.renderer.open_context().await?;
        let result = self.load_and_extract(context.as_mut(), url).await;
        context.close().await;

        if let Err(AttemptError::Render(e)) = &result {
            if e.is_timeout() {
                timeouts.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    async fn load_and_extract(
        &self,
        context: &mut dyn RenderContext,
        url: &str,
    ) -> Result<Option<ProductRecord>, AttemptError> {
        let page = context.navigate(url, self.page_timeout).await?;

        // Readiness is best effort and bounded
        let _ = tokio::time::timeout(self.settle_time, context.wait_until_ready(self.settle_time))
            .await;

        Ok(self.extractor.extract(&page)?)
    }
}
