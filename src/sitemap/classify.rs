//! Candidate URL classification
//!
//! Classification is a pure function of the URL string and the configured
//! pattern lists. Order of checks:
//! 1. Exclude patterns (always win)
//! 2. Product query parameter
//! 3. Category patterns

use crate::config::DiscoveryConfig;
use url::Url;

/// Decides which sitemap entries are product page candidates
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    product_query_param: String,
    exclude_patterns: Vec<String>,
    category_patterns: Vec<String>,
}

impl UrlClassifier {
    pub fn new(
        product_query_param: impl Into<String>,
        exclude_patterns: Vec<String>,
        category_patterns: Vec<String>,
    ) -> Self {
        Self {
            product_query_param: product_query_param.into(),
            exclude_patterns: lowercase_all(exclude_patterns),
            category_patterns: lowercase_all(category_patterns),
        }
    }

    /// Returns true if the URL plausibly references a product page
    ///
    /// Unparseable URLs are rejected.
    pub fn is_candidate(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        let lowered = url.to_lowercase();
        if self
            .exclude_patterns
            .iter()
            .any(|p| lowered.contains(p.as_str()))
        {
            return false;
        }

        if parsed
            .query_pairs()
            .any(|(key, _)| key == self.product_query_param.as_str())
        {
            return true;
        }

        self.category_patterns
            .iter()
            .any(|p| lowered.contains(p.as_str()))
    }
}

impl From<&DiscoveryConfig> for UrlClassifier {
    fn from(config: &DiscoveryConfig) -> Self {
        Self::new(
            config.product_query_param.clone(),
            config.exclude_patterns.clone(),
            config.category_patterns.clone(),
        )
    }
}

/// Classifies a single URL against a discovery configuration
pub fn is_candidate_url(url: &str, config: &DiscoveryConfig) -> bool {
    UrlClassifier::from(config).is_candidate(url)
}

fn lowercase_all(patterns: Vec<String>) -> Vec<String> {
    patterns.into_iter().map(|p| p.to_lowercase()).collect()
}
