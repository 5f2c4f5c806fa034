//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog coverage and the latest session from the storage layer.

use crate::catalog::PersistedProduct;
use crate::storage::{CatalogSummary, ProductStore, SessionRecord};
use crate::CrawlError;

/// Number of recently seen products listed by `--stats`
pub const RECENT_PRODUCTS: usize = 10;

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Product counts and identifier coverage
    pub summary: CatalogSummary,

    /// The most recent crawl session, if any run has started
    pub latest_session: Option<SessionRecord>,

    /// Most recently seen products, newest first
    pub recent: Vec<PersistedProduct>,
}

impl CatalogStatistics {
    /// Share of products with a numeric price, as a percentage
    pub fn price_coverage(&self) -> f64 {
        percentage(self.summary.with_price, self.summary.total_products)
    }

    /// Share of products carrying at least a SKU, as a percentage
    pub fn sku_coverage(&self) -> f64 {
        percentage(self.summary.with_sku, self.summary.total_products)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The catalog store to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(store: &dyn ProductStore) -> Result<CatalogStatistics, CrawlError> {
    Ok(CatalogStatistics {
        summary: store.catalog_summary()?,
        latest_session: store.get_latest_session()?,
        recent: store.recently_seen(RECENT_PRODUCTS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    let summary = &stats.summary;
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Products: {}", summary.total_products);
    println!(
        "  With price: {} ({:.1}%)",
        summary.with_price,
        stats.price_coverage()
    );
    println!(
        "  In stock: {} ({:.1}%)",
        summary.in_stock,
        percentage(summary.in_stock, summary.total_products)
    );
    println!("  Change events: {}", summary.change_events);
    println!();

    println!("Identifier Coverage:");
    println!("  SKU: {} ({:.1}%)", summary.with_sku, stats.sku_coverage());
    println!(
        "  EAN: {} ({:.1}%)",
        summary.with_ean,
        percentage(summary.with_ean, summary.total_products)
    );
    println!(
        "  VVS: {} ({:.1}%)",
        summary.with_vvs,
        percentage(summary.with_vvs, summary.total_products)
    );
    println!();

    match &stats.latest_session {
        Some(session) => {
            println!("Latest Session (#{}):", session.id);
            println!("  Status: {}", session.status.to_db_string());
            println!("  Started: {}", session.started_at);
            if let Some(completed) = &session.completed_at {
                println!("  Completed: {}", completed);
            }
            println!("  Discovered: {}", session.stats.urls_discovered);
            println!(
                "  Processed: {} (added {}, updated {}, errors {}, skipped {})",
                session.stats.products_processed,
                session.stats.products_added,
                session.stats.products_updated,
                session.stats.errors,
                session.stats.skipped
            );
            println!(
                "  Retries: {}, timeouts: {}",
                session.stats.retries, session.stats.timeouts
            );
            if let Some(ms) = session.duration_ms {
                println!("  Duration: {:.1}s", ms as f64 / 1000.0);
            }
            if let Some(message) = &session.error_message {
                println!("  Error: {}", message);
            }
        }
        None => println!("No crawl sessions recorded"),
    }
    println!();

    if !stats.recent.is_empty() {
        println!("Recently Seen ({}):", stats.recent.len());
        for product in &stats.recent {
            println!(
                "  - [{}] {} ({})",
                product.id,
                product.product.name.as_deref().unwrap_or("<unnamed>"),
                product.last_seen_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
