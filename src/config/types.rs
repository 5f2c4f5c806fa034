use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Shelf-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub sitemaps: SitemapConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub catalog: CatalogConfig,
}

/// Extraction scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of extraction tasks in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Number of candidates per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Navigation timeout per attempt (milliseconds)
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Upper bound on the content-readiness wait after navigation (milliseconds)
    #[serde(default = "default_settle_time_ms")]
    pub settle_time_ms: u64,

    /// Retries after the first failed navigation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay; attempt N waits N times this value (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Pause inserted after each batch (milliseconds)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Consecutive failures tolerated before the run is aborted
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    /// Emit a progress line every N processed candidates
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Whether the renderer should run without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Sitemap source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SitemapConfig {
    /// Root sitemap (or sitemap index) URLs
    pub roots: Vec<String>,

    /// Total fetch attempts per sitemap
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    /// Base backoff between fetch attempts (milliseconds)
    #[serde(default = "default_fetch_backoff_ms")]
    pub fetch_backoff_ms: u64,

    /// Timeout for a single sitemap request (milliseconds)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Pause between consecutive sitemap fetches (milliseconds)
    #[serde(default = "default_sitemap_pause_ms")]
    pub pause_ms: u64,
}

/// Candidate URL classification and run window
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// Query key that marks a product page (e.g. `id` in `?id=1234-567890`)
    #[serde(default = "default_product_query_param")]
    pub product_query_param: String,

    /// Substrings that disqualify a URL outright
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Substrings of known product-category paths
    #[serde(default)]
    pub category_patterns: Vec<String>,

    /// Number of discovered candidates to skip
    #[serde(default)]
    pub offset: usize,

    /// Maximum number of candidates to process after the offset
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Catalog persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Currency recorded when the page does not state one
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            page_timeout_ms: default_page_timeout_ms(),
            settle_time_ms: default_settle_time_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            progress_interval: default_progress_interval(),
            headless: default_headless(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            product_query_param: default_product_query_param(),
            exclude_patterns: Vec::new(),
            category_patterns: Vec::new(),
            offset: 0,
            limit: None,
        }
    }
}

impl CrawlerConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn default_concurrency() -> u32 {
    2
}

fn default_batch_size() -> u32 {
    10
}

fn default_page_timeout_ms() -> u64 {
    60_000
}

fn default_settle_time_ms() -> u64 {
    800
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_batch_delay_ms() -> u64 {
    2_000
}

fn default_circuit_breaker_threshold() -> u32 {
    20
}

fn default_progress_interval() -> u64 {
    20
}

fn default_headless() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("ShelfSweep/{} (catalog crawler)", env!("CARGO_PKG_VERSION"))
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_fetch_backoff_ms() -> u64 {
    1_000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_sitemap_pause_ms() -> u64 {
    300
}

fn default_product_query_param() -> String {
    "id".to_string()
}

fn default_currency() -> String {
    "DKK".to_string()
}
