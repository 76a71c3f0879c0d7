//! Storage module for the persistent article store
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Category listing and seeding
//! - Insert-if-absent link and content merges with per-category sequences
//! - Table statistics

mod schema;
mod sqlite;
mod traits;

pub use schema::TABLES;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::url::category_name;
use std::sync::{Arc, Mutex, MutexGuard};

/// Store handle shared between the coordinator and the merge engine
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Locks the shared store
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// A news category with its listing URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category {
    pub id: i64,
    pub url: String,
}

impl Category {
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }

    /// Name derived from the listing URL, used to key staging locations
    pub fn name(&self) -> String {
        category_name(&self.url)
    }
}

/// A content row ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRow {
    pub category_id: i64,
    pub publish_timestamp: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
}

/// Outcome of an insert-if-absent merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Rows newly written
    pub inserted: usize,
    /// Rows ignored because their unique key already existed
    pub skipped: usize,
    /// Highest sequence assigned, if any row was inserted
    pub last_sequence: Option<i64>,
}

/// Rows removed by a reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub links: usize,
    pub contents: usize,
}

/// Shape and size of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: u64,
}
