//! Storage traits and error types
//!
//! This module defines the contract the catalog pipeline uses to reach persisted
//! products, change history and crawl sessions.

use crate::catalog::{ChangeEvent, IdentifierKind, PersistedProduct, ProductPatch, ProductRecord};
use crate::session::CrawlStats;
use crate::storage::{CatalogSummary, SessionRecord, SessionStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for catalog storage backends
///
/// Writes take `&mut self`; callers share a store behind a mutex so that a
/// lookup and the write that depends on it happen atomically.
pub trait ProductStore {
    // ===== Products =====

    /// Finds the product holding the given identifier
    ///
    /// # Arguments
    ///
    /// * `kind` - Which identifier column to search
    /// * `value` - The identifier value (exact match)
    ///
    /// # Returns
    ///
    /// The matching product, if any. URL lookups return the oldest match.
    fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> StorageResult<Option<PersistedProduct>>;

    /// Gets a product by ID
    fn get_product(&self, id: i64) -> StorageResult<PersistedProduct>;

    /// Inserts a new product, stamping all three timestamps with `seen_at`
    fn insert(
        &mut self,
        record: &ProductRecord,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<PersistedProduct>;

    /// Replaces the attributes of an existing product and appends its change events
    ///
    /// Both writes commit together or not at all. `first_seen_at` is never touched.
    fn apply_update(
        &mut self,
        id: i64,
        patch: &ProductPatch,
        events: &[ChangeEvent],
    ) -> StorageResult<()>;

    /// Sets or clears one identifier of a product
    fn set_identifier(
        &mut self,
        id: i64,
        kind: IdentifierKind,
        value: Option<&str>,
    ) -> StorageResult<()>;

    // ===== Change history =====

    /// Gets the change history of a product, oldest first
    fn get_changes(&self, product_id: i64) -> StorageResult<Vec<ChangeEvent>>;

    // ===== Sessions =====

    /// Creates a session in the running state
    ///
    /// # Returns
    ///
    /// The ID of the newly created session
    fn create_session(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Writes the terminal status, counters, duration and error message of a session
    fn finalize_session(
        &mut self,
        id: i64,
        status: SessionStatus,
        stats: &CrawlStats,
        duration: Duration,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets a session by ID
    fn get_session(&self, id: i64) -> StorageResult<SessionRecord>;

    /// Gets the most recent session
    fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>>;

    // ===== Statistics =====

    /// Counts products, price coverage and identifier coverage
    fn catalog_summary(&self) -> StorageResult<CatalogSummary>;

    /// Gets the most recently seen products
    fn recently_seen(&self, limit: usize) -> StorageResult<Vec<PersistedProduct>>;
}
