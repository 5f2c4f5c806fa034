//! Sitemap discovery against a mock server

use crate::{create_test_config, mount_xml, sitemap_index, urlset};
use shelf_sweep::sitemap::SitemapResolver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_deny_list_filters_candidates() {
    let server = MockServer::start().await;
    let base = server.uri();

    let locs = vec![
        format!("{}/p?id=A", base),
        format!("{}/brands/bosch?id=B", base),
        format!("{}/p?id=C", base),
        format!("{}/about-us", base),
    ];
    mount_xml(&server, "/sitemap.xml", urlset(&locs), 1).await;

    let config = create_test_config(&base, "unused.db");
    let resolver = SitemapResolver::from_config(&config).unwrap();
    let report = resolver.discover(&config.sitemaps.roots).await;

    assert_eq!(
        report.candidates,
        vec![format!("{}/p?id=A", base), format!("{}/p?id=C", base)]
    );
    assert_eq!(report.locs_seen, 4);
    assert_eq!(report.locs_rejected, 2);
}

#[tokio::test]
async fn test_sitemap_cycle_fetches_each_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    // sitemap.xml -> a.xml -> sitemap.xml, plus products.xml
    mount_xml(
        &server,
        "/sitemap.xml",
        sitemap_index(&[format!("{}/a.xml", base), format!("{}/products.xml", base)]),
        1,
    )
    .await;
    mount_xml(
        &server,
        "/a.xml",
        sitemap_index(&[format!("{}/sitemap.xml", base)]),
        1,
    )
    .await;
    mount_xml(
        &server,
        "/products.xml",
        urlset(&[format!("{}/p?id=1", base), format!("{}/p?id=2", base)]),
        1,
    )
    .await;

    let config = create_test_config(&base, "unused.db");
    let resolver = SitemapResolver::from_config(&config).unwrap();
    let report = resolver.discover(&config.sitemaps.roots).await;

    assert_eq!(report.sitemaps_visited, 3);
    assert_eq!(report.candidates.len(), 2);
    server.verify().await;
}

#[tokio::test]
async fn test_failed_branch_is_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_xml(
        &server,
        "/sitemap.xml",
        sitemap_index(&[
            format!("{}/broken.xml", base),
            format!("{}/garbled.xml", base),
            format!("{}/products.xml", base),
        ]),
        1,
    )
    .await;
    // Retried up to fetch-attempts times
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    // Malformed XML is not retried
    mount_xml(&server, "/garbled.xml", "<urlset><url><loc>x</url></urlset>".to_string(), 1).await;
    mount_xml(
        &server,
        "/products.xml",
        urlset(&[format!("{}/p?id=9", base)]),
        1,
    )
    .await;

    let config = create_test_config(&base, "unused.db");
    let resolver = SitemapResolver::from_config(&config).unwrap();
    let report = resolver.discover(&config.sitemaps.roots).await;

    assert_eq!(report.candidates, vec![format!("{}/p?id=9", base)]);
    assert_eq!(report.sitemaps_failed, 2);
    server.verify().await;
}

#[tokio::test]
async fn test_duplicate_locs_across_sitemaps() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_xml(
        &server,
        "/sitemap.xml",
        sitemap_index(&[format!("{}/one.xml", base), format!("{}/two.xml", base)]),
        1,
    )
    .await;
    mount_xml(
        &server,
        "/one.xml",
        urlset(&[format!("{}/p?id=1", base), format!("{}/p?id=2", base)]),
        1,
    )
    .await;
    mount_xml(
        &server,
        "/two.xml",
        urlset(&[format!("{}/p?id=2", base), format!("{}/p?id=3", base)]),
        1,
    )
    .await;

    let config = create_test_config(&base, "unused.db");
    let resolver = SitemapResolver::from_config(&config).unwrap();
    let report = resolver.discover(&config.sitemaps.roots).await;

    assert_eq!(
        report.candidates,
        vec![
            format!("{}/p?id=1", base),
            format!("{}/p?id=2", base),
            format!("{}/p?id=3", base),
        ]
    );
}
