//! Storage module for persisting the catalog
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Product lookup by identifier, insert and update
//! - Change history for watched fields
//! - Crawl session tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{ProductStore, StorageError, StorageResult};

use crate::session::CrawlStats;
use crate::CrawlError;

use std::path::Path;

/// Opens or creates a catalog database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(CrawlError)` - Failed to initialize storage
pub fn open_store(path: &Path) -> Result<SqliteStore, CrawlError> {
    SqliteStore::new(path)
}

/// Represents a crawl session row
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub status: SessionStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub config_hash: String,
    pub stats: CrawlStats,
    /// Wall-clock run time, set when the session is finalized
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Aggregate catalog coverage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub total_products: u64,
    pub with_price: u64,
    pub in_stock: u64,
    pub with_sku: u64,
    pub with_ean: u64,
    pub with_vvs: u64,
    pub change_events: u64,
}
