use crate::config::types::{CatalogConfig, Config, CrawlerConfig, DiscoveryConfig, SitemapConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_sitemap_config(&config.sitemaps)?;
    validate_discovery_config(&config.discovery)?;
    validate_catalog_config(&config.catalog)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.page_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "page_timeout_ms must be >= 100ms, got {}ms",
            config.page_timeout_ms
        )));
    }

    if config.circuit_breaker_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "circuit_breaker_threshold must be >= 1, got {}",
            config.circuit_breaker_threshold
        )));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "progress_interval must be >= 1, got {}",
            config.progress_interval
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates sitemap roots and fetch settings
fn validate_sitemap_config(config: &SitemapConfig) -> Result<(), ConfigError> {
    if config.roots.is_empty() {
        return Err(ConfigError::Missing(
            "sitemaps.roots must list at least one sitemap URL".to_string(),
        ));
    }

    for root in &config.roots {
        validate_http_url(root)?;
    }

    if config.fetch_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_attempts must be >= 1, got {}",
            config.fetch_attempts
        )));
    }

    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.product_query_param.trim().is_empty() {
        return Err(ConfigError::Validation(
            "product_query_param cannot be empty".to_string(),
        ));
    }

    if config.exclude_patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::Validation(
            "exclude_patterns cannot contain empty entries".to_string(),
        ));
    }

    // An empty category pattern would match every URL.
    if config.category_patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::Validation(
            "category_patterns cannot contain empty entries".to_string(),
        ));
    }

    if config.limit == Some(0) {
        return Err(ConfigError::Validation(
            "limit must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.default_currency.len() != 3
        || !config.default_currency.chars().all(|c| c.is_ascii_uppercase())
    {
        return Err(ConfigError::Validation(format!(
            "default_currency must be a three-letter ISO code, got '{}'",
            config.default_currency
        )));
    }

    Ok(())
}

/// Validates that a URL parses and uses http or https
fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid sitemap URL '{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl(format!(
            "Sitemap URL '{}' must use http or https, got '{}'",
            raw, other
        ))),
    }
}
