//! Shelf-Sweep: a sitemap-driven product catalog crawler
//!
//! This crate discovers product pages from sitemap feeds, extracts structured product
//! data from each page, and reconciles the extracted records against a persisted
//! catalog keyed by overlapping, unreliable identifiers (SKU, EAN, VVS, URL).

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod output;
pub mod session;
pub mod sitemap;
pub mod storage;

use thiserror::Error;

/// Main error type for Shelf-Sweep operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Sitemap error: {0}")]
    Sitemap(#[from] sitemap::SitemapError),

    #[error(
        "Circuit breaker open: {consecutive_failures} consecutive failures (threshold {threshold})"
    )]
    CircuitOpen {
        consecutive_failures: u32,
        threshold: u32,
    },

    #[error("Scheduler task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing required setting: {0}")]
    Missing(String),
}

/// Result type alias for Shelf-Sweep operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{normalize_price, ProductRecord, Reconciler, Reconciliation};
pub use config::Config;
pub use crawler::{run_crawl, ExtractionScheduler, Outcome};
pub use session::{CrawlSession, CrawlStats};
pub use sitemap::{is_candidate_url, SitemapResolver, UrlClassifier};
