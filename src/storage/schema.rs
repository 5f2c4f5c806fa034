//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Shelf-Sweep catalog.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Catalog entities; identifiers are optional but unique when present
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    name TEXT,
    sku TEXT,
    ean TEXT,
    vvs TEXT,
    price_text TEXT,
    price_numeric REAL,
    currency TEXT,
    in_stock INTEGER,
    category TEXT,
    subcategory TEXT,
    brand TEXT,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_products_sku ON products(sku) WHERE sku IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_products_ean ON products(ean) WHERE ean IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_products_vvs ON products(vvs) WHERE vvs IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_products_url ON products(url);
CREATE INDEX IF NOT EXISTS idx_products_last_seen ON products(last_seen_at);

-- History of watched field changes
CREATE TABLE IF NOT EXISTS product_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(id),
    field_name TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    changed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_product_changes_product ON product_changes(product_id);

-- One row per crawl run
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    config_hash TEXT NOT NULL,
    urls_discovered INTEGER NOT NULL DEFAULT 0,
    products_processed INTEGER NOT NULL DEFAULT 0,
    products_added INTEGER NOT NULL DEFAULT 0,
    products_updated INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    retries INTEGER NOT NULL DEFAULT 0,
    timeouts INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER,
    error_message TEXT
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
