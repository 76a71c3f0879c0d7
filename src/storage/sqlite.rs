//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::staging::StagedLink;
use crate::storage::schema::{initialize_schema, TABLES};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{Category, ContentRow, InsertReport, ResetReport, TableSummary};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn count_rows(&self, table: &str, category_id: Option<i64>) -> StorageResult<u64> {
        let count: i64 = match category_id {
            Some(id) => self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE category_id = ?1", table),
                params![id],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table),
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }
}

fn max_sequence(conn: &Connection, table: &str, category_id: i64) -> StorageResult<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX(sequence), 0) FROM {} WHERE category_id = ?1",
        table
    );
    let max = conn.query_row(&sql, params![category_id], |row| row.get(0))?;
    Ok(max)
}

fn ensure_category(tx: &Transaction<'_>, category_id: i64) -> StorageResult<()> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1",
            params![category_id],
            |_| Ok(()),
        )
        .optional()?;
    exists.ok_or(StorageError::CategoryNotFound(category_id))
}

impl Storage for SqliteStorage {
    // ===== Categories =====

    fn list_categories(&self) -> StorageResult<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, url FROM categories ORDER BY id")?;

        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    fn insert_category_if_absent(&mut self, category: &Category) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO categories (id, url) VALUES (?1, ?2)",
            params![category.id, category.url],
        )?;
        Ok(changed == 1)
    }

    // ===== Links =====

    fn known_links(&self, category_id: i64) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM links WHERE category_id = ?1")?;

        let urls = stmt
            .query_map(params![category_id], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(urls)
    }

    fn max_link_sequence(&self, category_id: i64) -> StorageResult<i64> {
        max_sequence(&self.conn, "links", category_id)
    }

    fn insert_links(
        &mut self,
        category_id: i64,
        links: &[StagedLink],
    ) -> StorageResult<InsertReport> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        ensure_category(&tx, category_id)?;
        let mut last = max_sequence(&tx, "links", category_id)?;

        let mut report = InsertReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO links (sequence, category_id, url, merged_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(category_id, url) DO NOTHING",
            )?;

            for link in links {
                if link.category_id != category_id {
                    return Err(StorageError::CategoryMismatch {
                        expected: category_id,
                        found: link.category_id,
                    });
                }

                let sequence = if link.sequence > last {
                    link.sequence
                } else {
                    last + 1
                };

                if stmt.execute(params![sequence, category_id, link.url, now])? == 1 {
                    last = sequence;
                    report.inserted += 1;
                    report.last_sequence = Some(sequence);
                } else {
                    report.skipped += 1;
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }

    // ===== Contents =====

    fn max_content_sequence(&self, category_id: i64) -> StorageResult<i64> {
        max_sequence(&self.conn, "contents", category_id)
    }

    fn insert_contents(
        &mut self,
        category_id: i64,
        rows: &[ContentRow],
    ) -> StorageResult<InsertReport> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        ensure_category(&tx, category_id)?;
        let mut last = max_sequence(&tx, "contents", category_id)?;

        let mut report = InsertReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO contents
                    (sequence, category_id, publish_timestamp, title, body, url, merged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(category_id, publish_timestamp, title) DO NOTHING",
            )?;

            for row in rows {
                if row.category_id != category_id {
                    return Err(StorageError::CategoryMismatch {
                        expected: category_id,
                        found: row.category_id,
                    });
                }

                let sequence = last + 1;
                let changed = stmt.execute(params![
                    sequence,
                    category_id,
                    row.publish_timestamp,
                    row.title,
                    row.body,
                    row.url,
                    now
                ])?;

                if changed == 1 {
                    last = sequence;
                    report.inserted += 1;
                    report.last_sequence = Some(sequence);
                } else {
                    report.skipped += 1;
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }

    // ===== Maintenance =====

    fn reset(&mut self) -> StorageResult<ResetReport> {
        let tx = self.conn.transaction()?;
        let links = tx.execute("DELETE FROM links", [])?;
        let contents = tx.execute("DELETE FROM contents", [])?;
        tx.execute(
            "DELETE FROM sqlite_sequence WHERE name IN ('links', 'contents')",
            [],
        )?;
        tx.commit()?;

        tracing::info!("Reset store: {} links and {} contents deleted", links, contents);
        Ok(ResetReport { links, contents })
    }

    // ===== Statistics =====

    fn count_links(&self, category_id: Option<i64>) -> StorageResult<u64> {
        self.count_rows("links", category_id)
    }

    fn count_contents(&self, category_id: Option<i64>) -> StorageResult<u64> {
        self.count_rows("contents", category_id)
    }

    fn table_summaries(&self) -> StorageResult<Vec<TableSummary>> {
        let mut summaries = Vec::with_capacity(TABLES.len());

        for table in TABLES {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA table_info({})", table))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<Result<Vec<_>, _>>()?;

            let rows: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;

            summaries.push(TableSummary {
                name: table.to_string(),
                columns,
                rows: rows as u64,
            });
        }

        Ok(summaries)
    }
}
