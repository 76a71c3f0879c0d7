//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{Category, ContentRow, InsertReport, ResetReport, TableSummary};
use crate::staging::StagedLink;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Category not found: {0}")]
    CategoryNotFound(i64),

    #[error("Category mismatch: batch for {expected} contains a row for {found}")]
    CategoryMismatch { expected: i64, found: i64 },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Reads are used by the crawler to build its known set; the insert methods
/// are only ever called by the merge engine. Each insert method runs as one
/// transaction: either every non-duplicate row is committed or none is.
pub trait Storage {
    // ===== Categories =====

    /// Lists every category, ordered by id
    fn list_categories(&self) -> StorageResult<Vec<Category>>;

    /// Inserts a category unless its id already exists
    ///
    /// Returns true if a row was inserted.
    fn insert_category_if_absent(&mut self, category: &Category) -> StorageResult<bool>;

    // ===== Links =====

    /// All stored link URLs of a category
    fn known_links(&self, category_id: i64) -> StorageResult<HashSet<String>>;

    /// Highest stored link sequence of a category (0 when none)
    fn max_link_sequence(&self, category_id: i64) -> StorageResult<i64>;

    /// Inserts links, ignoring those whose `(category_id, url)` already exists
    ///
    /// A staged sequence is kept when it is above the last assigned sequence;
    /// otherwise the row receives the next free one. Skipped rows do not
    /// consume a sequence number.
    fn insert_links(&mut self, category_id: i64, links: &[StagedLink])
        -> StorageResult<InsertReport>;

    // ===== Contents =====

    /// Highest stored content sequence of a category (0 when none)
    fn max_content_sequence(&self, category_id: i64) -> StorageResult<i64>;

    /// Inserts contents, ignoring those whose
    /// `(category_id, publish_timestamp, title)` already exists
    fn insert_contents(&mut self, category_id: i64, rows: &[ContentRow])
        -> StorageResult<InsertReport>;

    // ===== Maintenance =====

    /// Deletes every link and content row and restarts their row counters
    ///
    /// Categories are kept. Runs as one transaction.
    fn reset(&mut self) -> StorageResult<ResetReport>;

    // ===== Statistics =====

    /// Counts stored links, optionally for one category
    fn count_links(&self, category_id: Option<i64>) -> StorageResult<u64>;

    /// Counts stored contents, optionally for one category
    fn count_contents(&self, category_id: Option<i64>) -> StorageResult<u64>;

    /// Column names and row counts of every table
    fn table_summaries(&self) -> StorageResult<Vec<TableSummary>>;
}
