//! End-to-end pipeline runs against a mock shop

use crate::{create_test_config, mount_product, mount_xml, product_page, product_url, urlset};
use shelf_sweep::crawler::{run_crawl, Pipeline};
use shelf_sweep::storage::{open_store, ProductStore, SessionStatus};
use shelf_sweep::CrawlError;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn db_path(dir: &TempDir) -> String {
    dir.path().join("catalog.db").to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_success_and_failure_are_counted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_xml(
        &server,
        "/sitemap.xml",
        urlset(&[product_url(&server, "A"), product_url(&server, "C")]),
        1,
    )
    .await;
    mount_product(&server, "A", product_page("Cordless drill 18V", "SKU-A", "1.299,95 kr.")).await;
    Mock::given(method("GET"))
        .and(path("/p"))
        .and(query_param("id", "C"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &db_path(&dir));
    let pipeline = Pipeline::from_config(config).unwrap();
    let report = pipeline.run("test-hash").await.unwrap();

    assert_eq!(report.stats.urls_discovered, 2);
    assert_eq!(report.stats.products_processed, 2);
    assert_eq!(report.stats.products_added, 1);
    assert_eq!(report.stats.errors, 1);

    let store = open_store(Path::new(&db_path(&dir))).unwrap();
    let session = store.get_latest_session().unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.config_hash, "test-hash");
    assert_eq!(session.stats, report.stats);

    let recent = store.recently_seen(10).unwrap();
    assert_eq!(recent.len(), 1);
    let product = &recent[0].product;
    assert_eq!(product.sku.as_deref(), Some("SKU-A"));
    assert_eq!(product.price_numeric, Some(1299.95));
    assert_eq!(product.currency.as_deref(), Some("DKK"));
    assert_eq!(product.in_stock, Some(true));
    assert_eq!(product.category.as_deref(), Some("Vaerktoej"));
}

#[tokio::test]
async fn test_unavailable_page_fails_after_retries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_xml(
        &server,
        "/sitemap.xml",
        urlset(&[product_url(&server, "A"), product_url(&server, "C")]),
        1,
    )
    .await;
    mount_product(&server, "A", product_page("Cordless drill 18V", "SKU-A", "1.299,95 kr.")).await;
    // First attempt plus two retries
    Mock::given(method("GET"))
        .and(path("/p"))
        .and(query_param("id", "C"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), &db_path(&dir));
    config.crawler.max_retries = 2;
    let report = Pipeline::from_config(config)
        .unwrap()
        .run("test-hash")
        .await
        .unwrap();

    assert_eq!(report.stats.products_processed, 2);
    assert_eq!(report.stats.products_added, 1);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.scheduler.retries, 2);

    let store = open_store(Path::new(&db_path(&dir))).unwrap();
    let session = store.get_latest_session().unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stats.retries, 2);
    assert!(session.duration_ms.is_some());
    server.verify().await;
}

#[tokio::test]
async fn test_same_sku_on_two_pages_updates_one_product() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_xml(
        &server,
        "/sitemap.xml",
        urlset(&[product_url(&server, "1"), product_url(&server, "2")]),
        1,
    )
    .await;
    mount_product(&server, "1", product_page("Spirit level", "LV-60", "100,00")).await;
    mount_product(&server, "2", product_page("Spirit level", "LV-60", "89,50")).await;

    let config = create_test_config(&server.uri(), &db_path(&dir));
    let report = Pipeline::from_config(config)
        .unwrap()
        .run("test-hash")
        .await
        .unwrap();

    assert_eq!(report.stats.products_added, 1);
    assert_eq!(report.stats.products_updated, 1);

    let store = open_store(Path::new(&db_path(&dir))).unwrap();
    let summary = store.catalog_summary().unwrap();
    assert_eq!(summary.total_products, 1);

    let product = &store.recently_seen(1).unwrap()[0];
    assert_eq!(product.product.price_numeric, Some(89.5));
    let changes = store.get_changes(product.id).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].old_value.as_deref(), Some("100"));
    assert_eq!(changes[0].new_value.as_deref(), Some("89.5"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_xml(
        &server,
        "/sitemap.xml",
        urlset(&[product_url(&server, "1")]),
        2,
    )
    .await;
    mount_product(&server, "1", product_page("Wood screws", "WS-440", "49,95")).await;

    for _ in 0..2 {
        let config = create_test_config(&server.uri(), &db_path(&dir));
        Pipeline::from_config(config)
            .unwrap()
            .run("test-hash")
            .await
            .unwrap();
    }

    let store = open_store(Path::new(&db_path(&dir))).unwrap();
    let summary = store.catalog_summary().unwrap();
    assert_eq!(summary.total_products, 1);
    assert_eq!(summary.change_events, 0);

    let session = store.get_latest_session().unwrap().unwrap();
    assert_eq!(session.stats.products_updated, 1);
    assert_eq!(session.stats.products_added, 0);
}

#[tokio::test]
async fn test_circuit_breaker_aborts_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let urls: Vec<String> = (1..=6).map(|i| product_url(&server, &i.to_string())).collect();
    mount_xml(&server, "/sitemap.xml", urlset(&urls), 1).await;
    Mock::given(method("GET"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), &db_path(&dir));
    config.crawler.circuit_breaker_threshold = 1;

    let result = Pipeline::from_config(config).unwrap().run("test-hash").await;
    assert!(matches!(
        result,
        Err(CrawlError::CircuitOpen {
            consecutive_failures: 2,
            threshold: 1
        })
    ));

    let store = open_store(Path::new(&db_path(&dir))).unwrap();
    let session = store.get_latest_session().unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.stats.urls_discovered, 6);
    assert_eq!(session.stats.products_processed, 2);
    assert_eq!(session.stats.errors, 2);
    assert!(session.duration_ms.is_some());
    assert!(session.error_message.unwrap().contains("Circuit breaker"));
}

#[tokio::test]
async fn test_run_crawl_with_window() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let urls: Vec<String> = (1..=5).map(|i| product_url(&server, &i.to_string())).collect();
    mount_xml(&server, "/sitemap.xml", urlset(&urls), 1).await;
    for i in 1..=5 {
        let id = i.to_string();
        mount_product(&server, &id, product_page("Hammer", &format!("H-{}", i), "120")).await;
    }

    let mut config = create_test_config(&server.uri(), &db_path(&dir));
    config.discovery.offset = 1;
    config.discovery.limit = Some(3);

    let report = run_crawl(config, "test-hash").await.unwrap();

    assert_eq!(report.stats.urls_discovered, 3);
    assert_eq!(report.stats.products_added, 3);
    assert!(!report.scheduler.stopped);

    let store = open_store(Path::new(&db_path(&dir))).unwrap();
    let skus: Vec<String> = store
        .recently_seen(10)
        .unwrap()
        .into_iter()
        .filter_map(|p| p.product.sku)
        .collect();
    assert_eq!(skus.len(), 3);
    assert!(!skus.contains(&"H-1".to_string()));
    assert!(!skus.contains(&"H-5".to_string()));
}
