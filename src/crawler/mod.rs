//! Crawler module for product page extraction
//!
//! This module contains the extraction side of a run, including:
//! - Page rendering behind the `PageRenderer` / `RenderContext` traits
//! - Product field extraction behind `FieldExtractor`
//! - Batched, bounded-concurrency scheduling with retry and a circuit breaker
//! - Overall pipeline coordination

mod circuit;
mod coordinator;
mod extractor;
mod renderer;
mod retry;
mod scheduler;

pub use circuit::CircuitBreaker;
pub use coordinator::{apply_window, run_crawl, CrawlReport, Pipeline, ProgressSnapshot};
pub use extractor::{ExtractionError, FieldExtractor, MicrodataExtractor};
pub use renderer::{HttpRenderer, PageRenderer, RenderContext, RenderError, RenderedPage};
pub use retry::{with_timeout, Retried, RetryPolicy};
pub use scheduler::{
    ExtractionScheduler, FailureClass, Outcome, SchedulerSettings, SchedulerSummary, StopSignal,
    TaskOutcome,
};
