//! Integration tests for Shelf-Sweep
//!
//! These tests use wiremock to serve sitemaps and product pages and run
//! discovery and the full pipeline end-to-end against a temporary catalog.

mod discovery_tests;
mod pipeline_tests;

use shelf_sweep::config::{CatalogConfig, Config, CrawlerConfig, DiscoveryConfig, SitemapConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration rooted at `<server>/sitemap.xml`
pub fn create_test_config(server_uri: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            concurrency: 1,
            batch_size: 5,
            page_timeout_ms: 2_000,
            settle_time_ms: 1,
            max_retries: 0,
            retry_delay_ms: 1,
            batch_delay_ms: 1,
            circuit_breaker_threshold: 5,
            progress_interval: 1,
            headless: true,
            user_agent: "ShelfSweep/test".to_string(),
        },
        sitemaps: SitemapConfig {
            roots: vec![format!("{}/sitemap.xml", server_uri)],
            fetch_attempts: 2,
            fetch_backoff_ms: 1,
            fetch_timeout_ms: 2_000,
            pause_ms: 0,
        },
        discovery: DiscoveryConfig {
            product_query_param: "id".to_string(),
            exclude_patterns: vec!["/brands/".to_string()],
            category_patterns: vec![],
            offset: 0,
            limit: None,
        },
        catalog: CatalogConfig {
            database_path: db_path.to_string(),
            default_currency: "DKK".to_string(),
        },
    }
}

pub fn urlset(locs: &[String]) -> String {
    let entries: String = locs
        .iter()
        .map(|loc| format!("  <url><loc>{}</loc></url>\n", loc))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}</urlset>",
        entries
    )
}

pub fn sitemap_index(locs: &[String]) -> String {
    let entries: String = locs
        .iter()
        .map(|loc| format!("  <sitemap><loc>{}</loc></sitemap>\n", loc))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<sitemapindex xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}</sitemapindex>",
        entries
    )
}

pub fn product_page(name: &str, sku: &str, price: &str) -> String {
    format!(
        r#"<html><head><title>{name}</title></head><body>
<nav class="breadcrumb"><a href="/">Forside</a><a href="/vaerktoej/">Vaerktoej</a></nav>
<div itemscope itemtype="https://schema.org/Product">
  <h1 itemprop="name">{name}</h1>
  <span itemprop="sku">{sku}</span>
  <span itemprop="price">{price}</span>
  <link itemprop="availability" href="https://schema.org/InStock">
</div>
</body></html>"#
    )
}

/// Mounts an XML document at `route`, expecting exactly `hits` requests
pub async fn mount_xml(server: &MockServer, route: &str, body: String, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/xml"),
        )
        .expect(hits)
        .mount(server)
        .await;
}

/// Mounts a product page at `/p?id=<id>`
pub async fn mount_product(server: &MockServer, id: &str, html: String) {
    Mock::given(method("GET"))
        .and(path("/p"))
        .and(query_param("id", id))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

pub fn product_url(server: &MockServer, id: &str) -> String {
    format!("{}/p?id={}", server.uri(), id)
}
