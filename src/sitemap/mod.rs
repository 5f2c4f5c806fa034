//! Sitemap discovery
//!
//! This module expands sitemap indexes into the candidate product URLs of a
//! catalog run:
//! - Fetching sitemap documents with retry and per-request timeouts
//! - Parsing `sitemapindex` and `urlset` documents
//! - Following child sitemaps once each, even when references form a cycle
//! - Classifying page URLs as product candidates

mod classify;
mod parser;

pub use classify::{is_candidate_url, UrlClassifier};
pub use parser::{parse_sitemap, SitemapDocument};

use crate::config::Config;
use crate::crawler::RetryPolicy;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors for a single sitemap branch
///
/// None of these abort discovery; the failing branch contributes nothing.
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed sitemap XML: {0}")]
    Xml(String),

    #[error("Unexpected root element <{0}>")]
    UnknownRoot(String),
}

impl SitemapError {
    /// Whether another fetch attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}

/// What discovery found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Candidate URLs, deduplicated, in discovery order
    pub candidates: Vec<String>,
    pub sitemaps_visited: usize,
    pub sitemaps_failed: usize,
    pub locs_seen: usize,
    pub locs_rejected: usize,
}

/// Fetches sitemaps and collects candidate URLs
pub struct SitemapResolver {
    client: Client,
    policy: RetryPolicy,
    classifier: UrlClassifier,
    pause: Duration,
}

impl SitemapResolver {
    pub fn new(
        client: Client,
        policy: RetryPolicy,
        classifier: UrlClassifier,
        pause: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            classifier,
            pause,
        }
    }

    /// Builds a resolver from the `[sitemaps]` and `[discovery]` sections
    pub fn from_config(config: &Config) -> Result<Self, SitemapError> {
        let client = build_http_client(
            &config.crawler.user_agent,
            Duration::from_millis(config.sitemaps.fetch_timeout_ms),
        )?;
        let policy = RetryPolicy::new(
            config.sitemaps.fetch_attempts,
            Duration::from_millis(config.sitemaps.fetch_backoff_ms),
        );

        Ok(Self::new(
            client,
            policy,
            UrlClassifier::from(&config.discovery),
            Duration::from_millis(config.sitemaps.pause_ms),
        ))
    }

    /// Expands the root sitemaps into candidate URLs
    ///
    /// Child sitemaps are visited depth-first in document order. Each distinct
    /// sitemap URL is fetched at most once.
    pub async fn discover(&self, roots: &[String]) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_candidates: HashSet<String> = HashSet::new();
        let mut worklist: VecDeque<String> = roots.iter().cloned().collect();

        while let Some(sitemap_url) = worklist.pop_front() {
            if !visited.insert(sitemap_url.clone()) {
                tracing::debug!("Skipping already visited sitemap {}", sitemap_url);
                continue;
            }

            if report.sitemaps_visited > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            report.sitemaps_visited += 1;

            let document = match self.fetch_document(&sitemap_url).await {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!("Sitemap {} skipped: {}", sitemap_url, e);
                    report.sitemaps_failed += 1;
                    continue;
                }
            };

            match document {
                SitemapDocument::Index(children) => {
                    tracing::info!(
                        "Sitemap index {} lists {} sitemaps",
                        sitemap_url,
                        children.len()
                    );
                    // Push in reverse so the first child is visited next
                    for child in children.iter().rev() {
                        let child = resolve_loc(&sitemap_url, child);
                        if !visited.contains(&child) {
                            worklist.push_front(child);
                        }
                    }
                }
                SitemapDocument::UrlSet(locs) => {
                    let before = report.candidates.len();
                    for loc in &locs {
                        report.locs_seen += 1;
                        let loc = resolve_loc(&sitemap_url, loc);
                        if !self.classifier.is_candidate(&loc) {
                            report.locs_rejected += 1;
                            continue;
                        }
                        if seen_candidates.insert(loc.clone()) {
                            report.candidates.push(loc);
                        }
                    }
                    tracing::info!(
                        "Sitemap {}: {} entries, {} new candidates",
                        sitemap_url,
                        locs.len(),
                        report.candidates.len() - before
                    );
                }
            }
        }

        tracing::info!(
            "Discovery finished: {} candidates from {} sitemaps ({} failed, {} of {} entries rejected)",
            report.candidates.len(),
            report.sitemaps_visited,
            report.sitemaps_failed,
            report.locs_rejected,
            report.locs_seen
        );

        report
    }

    /// Fetches and parses one sitemap, retrying transport and status failures
    async fn fetch_document(&self, url: &str) -> Result<SitemapDocument, SitemapError> {
        let retried = self
            .policy
            .run(
                &format!("Sitemap fetch {}", url),
                |_| self.fetch_text(url),
                SitemapError::is_transient,
            )
            .await;

        parse_sitemap(&retried.result?)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, SitemapError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SitemapError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Builds the HTTP client used for sitemap requests
///
/// # Arguments
///
/// * `user_agent` - User agent header value
/// * `timeout` - Whole-request timeout
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Resolves a `<loc>` against the sitemap it came from
fn resolve_loc(base: &str, loc: &str) -> String {
    if Url::parse(loc).is_ok() {
        return loc.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(loc))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| loc.to_string())
}
