//! Shelf-Sweep main entry point
//!
//! This is the command-line interface for the Shelf-Sweep catalog crawler.

use anyhow::Context;
use clap::Parser;
use shelf_sweep::catalog::{reassign_identifier, IdentifierKind, RepairOutcome};
use shelf_sweep::config::{load_config_with_hash, Config};
use shelf_sweep::crawler::{apply_window, run_crawl};
use shelf_sweep::output::{load_statistics, print_statistics};
use shelf_sweep::sitemap::SitemapResolver;
use shelf_sweep::storage::open_store;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Shelf-Sweep: a sitemap-driven product catalog crawler
///
/// Shelf-Sweep discovers product pages from sitemaps, extracts product data
/// from each page, and keeps a SQLite catalog with price and stock history.
#[derive(Parser, Debug)]
#[command(name = "shelf-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A sitemap-driven product catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and list the candidates that would be crawled
    #[arg(long, conflicts_with_all = ["stats", "reassign"])]
    dry_run: bool,

    /// Show catalog statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "reassign"])]
    stats: bool,

    /// Correct a stored identifier and exit (PRODUCT_ID:KIND:VALUE, KIND is sku, ean or vvs)
    #[arg(long, value_name = "PRODUCT_ID:KIND:VALUE", value_parser = parse_reassignment)]
    reassign: Option<Reassignment>,
}

#[derive(Debug, Clone)]
struct Reassignment {
    product_id: i64,
    kind: IdentifierKind,
    value: String,
}

fn parse_reassignment(arg: &str) -> Result<Reassignment, String> {
    let mut parts = arg.splitn(3, ':');
    let (Some(id), Some(kind), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err("expected PRODUCT_ID:KIND:VALUE".to_string());
    };

    let product_id = id
        .parse::<i64>()
        .map_err(|e| format!("invalid product id '{}': {}", id, e))?;
    let kind = IdentifierKind::from_column(kind)
        .filter(|k| *k != IdentifierKind::Url)
        .ok_or_else(|| format!("unknown identifier kind '{}'", kind))?;
    if value.trim().is_empty() {
        return Err("identifier value must not be empty".to_string());
    }

    Ok(Reassignment {
        product_id,
        kind,
        value: value.trim().to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).with_context(|| format!("invalid configuration {}", cli.config.display()));
        }
    };

    if cli.dry_run {
        handle_dry_run(&config).await
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(reassignment) = cli.reassign {
        handle_reassign(&config, reassignment)
    } else {
        handle_crawl(config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_sweep=info,warn"),
            1 => EnvFilter::new("shelf_sweep=debug,info"),
            2 => EnvFilter::new("shelf_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: runs discovery and shows the candidate window
async fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Shelf-Sweep Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Page timeout: {}ms", config.crawler.page_timeout_ms);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!(
        "  Circuit breaker threshold: {}",
        config.crawler.circuit_breaker_threshold
    );

    println!("\nCatalog:");
    println!("  Database: {}", config.catalog.database_path);
    println!("  Default currency: {}", config.catalog.default_currency);

    println!("\nSitemap Roots ({}):", config.sitemaps.roots.len());
    for root in &config.sitemaps.roots {
        println!("  - {}", root);
    }

    // Discovery only; nothing is written to the catalog
    let resolver = SitemapResolver::from_config(config).context("failed to build HTTP client")?;
    let report = resolver.discover(&config.sitemaps.roots).await;
    let window = apply_window(
        &report.candidates,
        config.discovery.offset,
        config.discovery.limit,
    );

    println!(
        "\nDiscovery: {} sitemaps visited ({} failed), {} entries, {} rejected",
        report.sitemaps_visited, report.sitemaps_failed, report.locs_seen, report.locs_rejected
    );
    println!(
        "Candidates: {} discovered, {} in window (offset {}, limit {})",
        report.candidates.len(),
        window.len(),
        config.discovery.offset,
        config
            .discovery
            .limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    for url in window.iter().take(20) {
        println!("  * {}", url);
    }
    if window.len() > 20 {
        println!("  ... and {} more", window.len() - 20);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.catalog.database_path);

    let store = open_store(Path::new(&config.catalog.database_path))
        .context("failed to open catalog database")?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --reassign mode: corrects one stored identifier
fn handle_reassign(config: &Config, reassignment: Reassignment) -> anyhow::Result<()> {
    let mut store = open_store(Path::new(&config.catalog.database_path))
        .context("failed to open catalog database")?;

    let outcome = reassign_identifier(
        &mut store,
        reassignment.product_id,
        reassignment.kind,
        &reassignment.value,
    )
    .with_context(|| format!("failed to update product {}", reassignment.product_id))?;

    match outcome {
        RepairOutcome::Assigned => println!(
            "✓ Product {} now has {} {}",
            reassignment.product_id, reassignment.kind, reassignment.value
        ),
        RepairOutcome::Unchanged => println!(
            "Product {} already has {} {}",
            reassignment.product_id, reassignment.kind, reassignment.value
        ),
        RepairOutcome::Cleared {
            conflicting_product,
        } => println!(
            "! {} {} belongs to product {}; cleared it on product {}",
            reassignment.kind, reassignment.value, conflicting_product, reassignment.product_id
        ),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Sitemap roots: {}, concurrency: {}, batch size: {}",
        config.sitemaps.roots.len(),
        config.crawler.concurrency,
        config.crawler.batch_size
    );

    match run_crawl(config, config_hash).await {
        Ok(report) => {
            tracing::info!("Crawl session {} completed", report.session_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
