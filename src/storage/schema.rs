//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Paper-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Categories to harvest, provisioned externally or seeded from config
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL
);

-- Discovered article links
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence INTEGER NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    url TEXT NOT NULL,
    merged_at TEXT NOT NULL,
    UNIQUE(category_id, url),
    UNIQUE(category_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_links_category ON links(category_id);

-- Extracted article content
CREATE TABLE IF NOT EXISTS contents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence INTEGER NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    publish_timestamp TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    url TEXT,
    merged_at TEXT NOT NULL,
    UNIQUE(category_id, publish_timestamp, title),
    UNIQUE(category_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_contents_category ON contents(category_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Names of the tables created by [`SCHEMA_SQL`]
pub const TABLES: [&str; 3] = ["categories", "links", "contents"];
