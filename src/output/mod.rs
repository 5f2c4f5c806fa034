//! Output module for reporting on the catalog
//!
//! This module handles:
//! - Loading catalog coverage and session statistics
//! - Printing them for the `--stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};
