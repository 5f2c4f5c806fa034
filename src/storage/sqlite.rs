//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ProductStore trait.

use crate::catalog::{
    ChangeEvent, IdentifierKind, PersistedProduct, ProductPatch, ProductRecord, WatchedField,
};
use crate::session::CrawlStats;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ProductStore, StorageError, StorageResult};
use crate::storage::{CatalogSummary, SessionRecord, SessionStatus};
use crate::CrawlError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const PRODUCT_COLUMNS: &str = "id, url, name, sku, ean, vvs, price_text, price_numeric, currency,
     in_stock, category, subcategory, brand, first_seen_at, last_seen_at, updated_at";

const SESSION_COLUMNS: &str = "id, status, started_at, completed_at, config_hash, urls_discovered,
     products_processed, products_added, products_updated, errors, skipped, retries, timeouts,
     duration_ms, error_message";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ProductStore for SqliteStore {
    // ===== Products =====

    fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> StorageResult<Option<PersistedProduct>> {
        // Column names come from a closed enum, never from input
        let sql = format!(
            "SELECT {} FROM products WHERE {} = ?1 ORDER BY id LIMIT 1",
            PRODUCT_COLUMNS,
            kind.column()
        );

        let product = self
            .conn
            .query_row(&sql, params![value], product_from_row)
            .optional()?;

        Ok(product)
    }

    fn get_product(&self, id: i64) -> StorageResult<PersistedProduct> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        self.conn
            .query_row(&sql, params![id], product_from_row)
            .optional()?
            .ok_or(StorageError::ProductNotFound(id))
    }

    fn insert(
        &mut self,
        record: &ProductRecord,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<PersistedProduct> {
        let now = db_timestamp(seen_at);
        self.conn
            .execute(
                "INSERT INTO products (url, name, sku, ean, vvs, price_text, price_numeric,
                 currency, in_stock, category, subcategory, brand,
                 first_seen_at, last_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, ?13)",
                params![
                    record.url,
                    record.name,
                    record.sku,
                    record.ean,
                    record.vvs,
                    record.price_text,
                    record.price_numeric,
                    record.currency,
                    record.in_stock,
                    record.category,
                    record.subcategory,
                    record.brand,
                    now,
                ],
            )
            .map_err(constraint_error)?;

        Ok(PersistedProduct {
            id: self.conn.last_insert_rowid(),
            product: record.clone(),
            first_seen_at: seen_at,
            last_seen_at: seen_at,
            updated_at: seen_at,
        })
    }

    fn apply_update(
        &mut self,
        id: i64,
        patch: &ProductPatch,
        events: &[ChangeEvent],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        update_product(&tx, id, patch)?;
        insert_events(&tx, events)?;
        tx.commit()?;
        Ok(())
    }

    fn set_identifier(
        &mut self,
        id: i64,
        kind: IdentifierKind,
        value: Option<&str>,
    ) -> StorageResult<()> {
        let sql = format!(
            "UPDATE products SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            kind.column()
        );
        let changed = self
            .conn
            .execute(&sql, params![value, db_timestamp(Utc::now()), id])
            .map_err(constraint_error)?;

        if changed == 0 {
            return Err(StorageError::ProductNotFound(id));
        }
        Ok(())
    }

    // ===== Change history =====

    fn get_changes(&self, product_id: i64) -> StorageResult<Vec<ChangeEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT product_id, field_name, old_value, new_value, changed_at
             FROM product_changes WHERE product_id = ?1 ORDER BY id",
        )?;

        let events = stmt
            .query_map(params![product_id], |row| {
                let field_name: String = row.get(1)?;
                let field = WatchedField::ALL
                    .iter()
                    .copied()
                    .find(|f| f.as_str() == field_name)
                    .ok_or_else(|| {
                        conversion_error(1, format!("unknown field '{}'", field_name))
                    })?;
                Ok(ChangeEvent {
                    product_id: row.get(0)?,
                    field,
                    old_value: row.get(2)?,
                    new_value: row.get(3)?,
                    changed_at: timestamp_at(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    // ===== Sessions =====

    fn create_session(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = db_timestamp(Utc::now());
        self.conn.execute(
            "INSERT INTO crawl_sessions (status, started_at, config_hash) VALUES (?1, ?2, ?3)",
            params![SessionStatus::Running.to_db_string(), now, config_hash],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finalize_session(
        &mut self,
        id: i64,
        status: SessionStatus,
        stats: &CrawlStats,
        duration: Duration,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = db_timestamp(Utc::now());
        let changed = self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, completed_at = ?2, urls_discovered = ?3,
             products_processed = ?4, products_added = ?5, products_updated = ?6,
             errors = ?7, skipped = ?8, retries = ?9, timeouts = ?10, duration_ms = ?11,
             error_message = ?12
             WHERE id = ?13",
            params![
                status.to_db_string(),
                now,
                stats.urls_discovered as i64,
                stats.products_processed as i64,
                stats.products_added as i64,
                stats.products_updated as i64,
                stats.errors as i64,
                stats.skipped as i64,
                stats.retries as i64,
                stats.timeouts as i64,
                i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
                error_message,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::SessionNotFound(id));
        }
        Ok(())
    }

    fn get_session(&self, id: i64) -> StorageResult<SessionRecord> {
        let sql = format!(
            "SELECT {} FROM crawl_sessions WHERE id = ?1",
            SESSION_COLUMNS
        );
        self.conn
            .query_row(&sql, params![id], session_from_row)
            .optional()?
            .ok_or(StorageError::SessionNotFound(id))
    }

    fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_sessions ORDER BY id DESC LIMIT 1",
            SESSION_COLUMNS
        );
        let session = self
            .conn
            .query_row(&sql, [], session_from_row)
            .optional()?;
        Ok(session)
    }

    // ===== Statistics =====

    fn catalog_summary(&self) -> StorageResult<CatalogSummary> {
        let mut summary = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(price_numeric),
                    COALESCE(SUM(CASE WHEN in_stock = 1 THEN 1 ELSE 0 END), 0),
                    COUNT(sku),
                    COUNT(ean),
                    COUNT(vvs)
             FROM products",
            [],
            |row| {
                Ok(CatalogSummary {
                    total_products: row.get::<_, i64>(0)? as u64,
                    with_price: row.get::<_, i64>(1)? as u64,
                    in_stock: row.get::<_, i64>(2)? as u64,
                    with_sku: row.get::<_, i64>(3)? as u64,
                    with_ean: row.get::<_, i64>(4)? as u64,
                    with_vvs: row.get::<_, i64>(5)? as u64,
                    change_events: 0,
                })
            },
        )?;

        let changes: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM product_changes", [], |row| row.get(0))?;
        summary.change_events = changes as u64;

        Ok(summary)
    }

    fn recently_seen(&self, limit: usize) -> StorageResult<Vec<PersistedProduct>> {
        let sql = format!(
            "SELECT {} FROM products ORDER BY last_seen_at DESC, id DESC LIMIT ?1",
            PRODUCT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let products = stmt
            .query_map(params![limit as i64], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }
}

/// Rewrites a product row; the caller owns the transaction
fn update_product(conn: &Connection, id: i64, patch: &ProductPatch) -> StorageResult<()> {
    let record = &patch.product;
    let now = db_timestamp(patch.seen_at);
    let changed = conn
        .execute(
            "UPDATE products SET url = ?1, name = ?2, sku = ?3, ean = ?4, vvs = ?5,
             price_text = ?6, price_numeric = ?7, currency = ?8, in_stock = ?9,
             category = ?10, subcategory = ?11, brand = ?12,
             last_seen_at = ?13, updated_at = ?13
             WHERE id = ?14",
            params![
                record.url,
                record.name,
                record.sku,
                record.ean,
                record.vvs,
                record.price_text,
                record.price_numeric,
                record.currency,
                record.in_stock,
                record.category,
                record.subcategory,
                record.brand,
                now,
                id,
            ],
        )
        .map_err(constraint_error)?;

    if changed == 0 {
        return Err(StorageError::ProductNotFound(id));
    }
    Ok(())
}

fn insert_events(conn: &Connection, events: &[ChangeEvent]) -> StorageResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO product_changes (product_id, field_name, old_value, new_value, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for event in events {
        stmt.execute(params![
            event.product_id,
            event.field.as_str(),
            event.old_value,
            event.new_value,
            db_timestamp(event.changed_at),
        ])?;
    }
    Ok(())
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedProduct> {
    Ok(PersistedProduct {
        id: row.get(0)?,
        product: ProductRecord {
            url: row.get(1)?,
            name: row.get(2)?,
            sku: row.get(3)?,
            ean: row.get(4)?,
            vvs: row.get(5)?,
            price_text: row.get(6)?,
            price_numeric: row.get(7)?,
            currency: row.get(8)?,
            in_stock: row.get(9)?,
            category: row.get(10)?,
            subcategory: row.get(11)?,
            brand: row.get(12)?,
        },
        first_seen_at: timestamp_at(row, 13)?,
        last_seen_at: timestamp_at(row, 14)?,
        updated_at: timestamp_at(row, 15)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let status: String = row.get(1)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        status: SessionStatus::from_db_string(&status)
            .ok_or_else(|| conversion_error(1, format!("unknown status '{}'", status)))?,
        started_at: row.get(2)?,
        completed_at: row.get(3)?,
        config_hash: row.get(4)?,
        stats: CrawlStats {
            urls_discovered: row.get::<_, i64>(5)? as u64,
            products_processed: row.get::<_, i64>(6)? as u64,
            products_added: row.get::<_, i64>(7)? as u64,
            products_updated: row.get::<_, i64>(8)? as u64,
            errors: row.get::<_, i64>(9)? as u64,
            skipped: row.get::<_, i64>(10)? as u64,
            retries: row.get::<_, i64>(11)? as u64,
            timeouts: row.get::<_, i64>(12)? as u64,
        },
        duration_ms: row.get::<_, Option<i64>>(13)?.map(|ms| ms as u64),
        error_message: row.get(14)?,
    })
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering
fn db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| conversion_error(idx, StorageError::Timestamp(raw).to_string()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Maps unique-index violations to a dedicated error
fn constraint_error(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => StorageError::Sqlite(err),
    }
}
