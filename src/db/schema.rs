//! Database schema module - table definitions for a shard.
//!
//! Each shard holds the same schema: a `documents` table with one row per
//! file, and a `documents_fts` FTS5 table sharing its rowids.

use rusqlite::Connection;

use crate::{AppError, Result};

/// FTS5 tuning applied after schema creation.
const FTS_TUNING: &[(&str, i64)] = &[
    ("pgsz", 4096),
    ("crisismerge", 16),
    ("usermerge", 4),
    ("automerge", 8),
];

/// Initialize the shard schema.
///
/// # Schema
///
/// ## documents table
/// - `id`: Primary key, also the rowid of the FTS row
/// - `file_path`: Absolute path (unique)
/// - `file_name`: File name only
/// - `content`: Extracted text
/// - `file_type`: Extension including the dot
/// - `size`: File size in bytes
/// - `modified_time`: Unix timestamp (seconds, fractional)
/// - `indexed_time`: Unix timestamp of the last write
/// - `hash`: SHA-256 of the extracted content
///
/// ## documents_fts table
/// FTS5 with the trigram tokenizer over path, name, content and type, so
/// substring queries of three or more characters use the index.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT UNIQUE NOT NULL,
            file_name TEXT NOT NULL,
            content TEXT NOT NULL,
            file_type TEXT NOT NULL,
            size INTEGER,
            modified_time REAL,
            indexed_time REAL,
            hash TEXT
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
            file_path,
            file_name,
            content,
            file_type,
            tokenize='trigram'
        );

        CREATE INDEX IF NOT EXISTS idx_file_path ON documents(file_path);
        CREATE INDEX IF NOT EXISTS idx_file_type ON documents(file_type);
        CREATE INDEX IF NOT EXISTS idx_modified_time ON documents(modified_time);
        "#,
    )
    .map_err(|e| AppError::Database(format!("Failed to initialize schema: {}", e)))?;

    for (option, value) in FTS_TUNING {
        if let Err(e) = conn.execute(
            "INSERT INTO documents_fts(documents_fts, rank) VALUES(?1, ?2)",
            rusqlite::params![option, value],
        ) {
            tracing::debug!("FTS option {} not applied: {}", option, e);
        }
    }

    Ok(())
}

/// Check whether a connection already has the `documents` table.
pub fn has_documents_table(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='documents'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Database(format!("Failed to inspect schema: {}", e)))?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_init_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!has_documents_table(&conn).unwrap());
        init(&conn).unwrap();
        assert!(has_documents_table(&conn).unwrap());

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name='documents_fts'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_schema_init_creates_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(indexes.contains(&"idx_file_path".to_string()));
        assert!(indexes.contains(&"idx_file_type".to_string()));
        assert!(indexes.contains(&"idx_modified_time".to_string()));
    }

    #[test]
    fn test_schema_init_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();
    }
}
