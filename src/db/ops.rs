//! Database operations module - document writes, search and maintenance.
//!
//! All functions take a single shard connection. Fan-out across shards
//! lives in [`super::ShardSet`].

use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::search::{Layer, SearchHit};
use crate::text::{safe_truncate, QueryForms};
use crate::{AppError, Result};

/// Content stored per document is capped at this many characters.
pub const MAX_CONTENT_CHARS: usize = 2_000_000;

pub const MAX_NAME_CHARS: usize = 500;

pub const MAX_TYPE_CHARS: usize = 100;

/// Attempts made by [`upsert_with_retry`] before giving up.
pub const MAX_WRITE_ATTEMPTS: u32 = 8;

/// First backoff delay; doubles after every busy attempt.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Characters of content returned as a result preview.
pub const PREVIEW_CHARS: usize = 200;

/// Only the leading query patterns are tried against a shard.
const SHARD_PATTERNS: usize = 3;

/// A document ready to be written to a shard.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    /// Absolute path of the file
    pub file_path: String,
    /// File name only
    pub file_name: String,
    /// Extracted text
    pub content: String,
    /// Extension including the dot
    pub file_type: String,
    /// File size in bytes
    pub size: u64,
    /// Last modified time as Unix timestamp
    pub modified_time: f64,
    /// SHA-256 of the content, hex encoded
    pub hash: String,
}

impl DocumentRecord {
    /// Build a record, deriving the file name from the path.
    pub fn new(
        file_path: &str,
        content: &str,
        file_type: &str,
        size: u64,
        modified_time: f64,
        hash: &str,
    ) -> Self {
        let file_name = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file_path: file_path.to_string(),
            file_name,
            content: content.to_string(),
            file_type: file_type.to_string(),
            size,
            modified_time,
            hash: hash.to_string(),
        }
    }
}

/// Per-shard document statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardStats {
    pub file_count: i64,
    /// Document count per file type
    pub type_counts: BTreeMap<String, i64>,
}

/// Current time as fractional Unix seconds.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn sanitize(text: &str, max_chars: usize) -> String {
    safe_truncate(text, max_chars).replace('\0', "")
}

fn write_document(conn: &mut Connection, doc: &DocumentRecord) -> rusqlite::Result<()> {
    let content = sanitize(&doc.content, MAX_CONTENT_CHARS);
    let file_name = if doc.file_name.is_empty() {
        DocumentRecord::new(&doc.file_path, "", "", 0, 0.0, "").file_name
    } else {
        sanitize(&doc.file_name, MAX_NAME_CHARS)
    };
    let file_type = if doc.file_type.is_empty() {
        "unknown".to_string()
    } else {
        sanitize(&doc.file_type, MAX_TYPE_CHARS)
    };
    let now = unix_now();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = match tx.query_row(
        "SELECT id FROM documents WHERE file_path = ?1",
        params![doc.file_path],
        |row| row.get::<_, i64>(0),
    ) {
        Ok(id) => Some(id),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e),
    };

    let rowid = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE documents
                 SET content = ?1, file_name = ?2, file_type = ?3, size = ?4,
                     modified_time = ?5, indexed_time = ?6, hash = ?7
                 WHERE id = ?8",
                params![
                    content,
                    file_name,
                    file_type,
                    doc.size as i64,
                    doc.modified_time,
                    now,
                    doc.hash,
                    id
                ],
            )?;
            tx.execute("DELETE FROM documents_fts WHERE rowid = ?1", params![id])?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO documents (file_path, file_name, content, file_type, size,
                                        modified_time, indexed_time, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    doc.file_path,
                    file_name,
                    content,
                    file_type,
                    doc.size as i64,
                    doc.modified_time,
                    now,
                    doc.hash
                ],
            )?;
            tx.last_insert_rowid()
        }
    };

    tx.execute(
        "INSERT INTO documents_fts(rowid, file_path, file_name, content, file_type)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![rowid, doc.file_path, file_name, content, file_type],
    )?;

    tx.commit()
}

/// Insert or replace a document and its FTS row in one transaction.
pub fn upsert_document(conn: &mut Connection, doc: &DocumentRecord) -> Result<()> {
    write_document(conn, doc).map_err(|e| {
        AppError::Database(format!("Failed to store {}: {}", doc.file_path, e))
    })
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked
    )
}

/// [`upsert_document`] with exponential backoff on busy or locked errors.
pub fn upsert_with_retry(conn: &mut Connection, doc: &DocumentRecord) -> Result<()> {
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match write_document(conn, doc) {
            Ok(()) => return Ok(()),
            Err(e) if is_busy(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                tracing::debug!(
                    "Shard busy storing {} (attempt {}), retrying in {:?}",
                    doc.file_path,
                    attempt,
                    delay
                );
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) => {
                return Err(AppError::Database(format!(
                    "Failed to store {} after {} attempt(s): {}",
                    doc.file_path, attempt, e
                )))
            }
        }
    }
}

/// Remove a document. Returns whether it existed.
pub fn delete_document(conn: &mut Connection, file_path: &str) -> Result<bool> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::Database(format!("Failed to start transaction: {}", e)))?;

    let id = match tx.query_row(
        "SELECT id FROM documents WHERE file_path = ?1",
        params![file_path],
        |row| row.get::<_, i64>(0),
    ) {
        Ok(id) => id,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
        Err(e) => return Err(AppError::Database(format!("Failed to find document: {}", e))),
    };

    tx.execute("DELETE FROM documents_fts WHERE rowid = ?1", params![id])
        .map_err(|e| AppError::Database(format!("Failed to delete FTS row: {}", e)))?;
    tx.execute("DELETE FROM documents WHERE id = ?1", params![id])
        .map_err(|e| AppError::Database(format!("Failed to delete document: {}", e)))?;

    tx.commit()
        .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))?;
    Ok(true)
}

/// Stored content hash for a path, if the document exists.
pub fn document_hash(conn: &Connection, file_path: &str) -> Result<Option<String>> {
    let result = conn.query_row(
        "SELECT hash FROM documents WHERE file_path = ?1",
        params![file_path],
        |row| row.get::<_, Option<String>>(0),
    );

    match result {
        Ok(hash) => Ok(hash),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(format!("Failed to read hash: {}", e))),
    }
}

/// Get the number of documents in a shard.
pub fn document_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("Failed to count documents: {}", e)))
}

/// Document count and per-type breakdown for a shard.
pub fn shard_stats(conn: &Connection) -> Result<ShardStats> {
    let mut stats = ShardStats {
        file_count: document_count(conn)?,
        type_counts: BTreeMap::new(),
    };

    if stats.file_count == 0 {
        return Ok(stats);
    }

    let mut stmt = conn
        .prepare_cached("SELECT file_type, COUNT(*) FROM documents GROUP BY file_type")
        .map_err(|e| AppError::Database(format!("Failed to prepare stats: {}", e)))?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| AppError::Database(format!("Failed to execute stats: {}", e)))?;

    for row in rows {
        let (file_type, count) =
            row.map_err(|e| AppError::Database(format!("Failed to read row: {}", e)))?;
        stats.type_counts.insert(file_type, count);
    }

    Ok(stats)
}

/// Merge FTS segments, vacuum and refresh planner statistics.
pub fn optimize_shard(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "INSERT INTO documents_fts(documents_fts) VALUES('optimize');
         VACUUM;
         ANALYZE;
         PRAGMA optimize;",
    )
    .map_err(|e| AppError::Database(format!("Failed to optimize shard: {}", e)))
}

/// Convert a literal into a `LIKE` substring pattern.
fn like_pattern(literal: &str) -> String {
    let mut result = String::with_capacity(literal.len() + 2);
    result.push('%');
    for c in literal.chars() {
        if matches!(c, '%' | '_' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result.push('%');
    result
}

/// Quote a literal as an FTS5 phrase.
fn fts_phrase(literal: &str) -> String {
    format!("\"{}\"", literal.replace('"', "\"\""))
}

fn like_search(
    conn: &Connection,
    pattern: &str,
    limit: usize,
) -> rusqlite::Result<Vec<(SearchHit, f64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT file_path, file_name, substr(content, 1, ?3), file_type, size
         FROM documents
         WHERE content LIKE ?1 ESCAPE '\\' OR file_name LIKE ?1 ESCAPE '\\'
         ORDER BY file_name
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(
        params![like_pattern(pattern), limit as i64, PREVIEW_CHARS as i64],
        |row| Ok((row_to_hit(row)?, 0.0)),
    )?;
    rows.collect()
}

fn fts_search(
    conn: &Connection,
    pattern: &str,
    limit: usize,
) -> rusqlite::Result<Vec<(SearchHit, f64)>> {
    let phrase = fts_phrase(pattern);
    let query = format!("content:{} OR file_name:{}", phrase, phrase);

    let mut stmt = conn.prepare_cached(
        "SELECT d.file_path, d.file_name, substr(d.content, 1, ?3), d.file_type, d.size, m.rank
         FROM (SELECT rowid AS id, rank FROM documents_fts
               WHERE documents_fts MATCH ?1
               ORDER BY rank
               LIMIT ?2) AS m
         JOIN documents d ON d.id = m.id
         ORDER BY m.rank",
    )?;

    let rows = stmt.query_map(params![query, limit as i64, PREVIEW_CHARS as i64], |row| {
        Ok((row_to_hit(row)?, row.get::<_, f64>(5)?))
    })?;
    rows.collect()
}

fn row_to_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHit> {
    Ok(SearchHit {
        file_path: row.get(0)?,
        file_name: row.get(1)?,
        preview: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        layer: Layer::Immediate,
        file_type: row.get(3)?,
        size: row.get::<_, Option<i64>>(4)?.unwrap_or(0).max(0) as u64,
        score: 0.0,
    })
}

/// Search one shard with the leading query patterns.
///
/// Patterns of one or two characters cannot use the trigram index and go
/// through `LIKE`; the first such pattern with hits ends the search.
/// Longer patterns use FTS5 `MATCH`, scored by negated `rank` so higher
/// is better. Patterns shorter than `min(query length, 3)` are skipped,
/// the same floor [`QueryForms::matches`] applies.
pub fn search_shard(
    conn: &Connection,
    forms: &QueryForms,
    limit: usize,
    shard: usize,
) -> Result<Vec<SearchHit>> {
    let total = forms.patterns.len();
    let min_len = forms.query_len().min(3);
    let mut hits = Vec::new();

    for (idx, pattern) in forms.patterns.iter().take(SHARD_PATTERNS).enumerate() {
        let weight = (total - idx) as f64;
        let len = pattern.chars().count();
        if len < min_len {
            continue;
        }

        if len <= 2 {
            let rows = match like_search(conn, pattern, limit) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::debug!("Shard {} LIKE search failed for {:?}: {}", shard, pattern, e);
                    continue;
                }
            };
            let found = !rows.is_empty();
            hits.extend(rows.into_iter().map(|(mut hit, _)| {
                hit.layer = Layer::Complete { shard };
                hit.score = 1.5 + 0.2 * weight;
                hit
            }));
            if found {
                break;
            }
        } else {
            let rows = match fts_search(conn, pattern, limit) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::debug!("Shard {} MATCH failed for {:?}: {}", shard, pattern, e);
                    continue;
                }
            };
            hits.extend(rows.into_iter().map(|(mut hit, rank)| {
                hit.layer = Layer::Complete { shard };
                hit.score = -rank + 0.1 * weight;
                hit
            }));
        }
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        conn
    }

    fn doc(path: &str, content: &str) -> DocumentRecord {
        DocumentRecord::new(path, content, ".txt", content.len() as u64, 1_700_000_000.0, "hash")
    }

    #[test]
    fn test_record_derives_file_name() {
        let d = doc("/srv/docs/report.txt", "x");
        assert_eq!(d.file_name, "report.txt");
    }

    #[test]
    fn test_upsert_inserts_and_updates() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/a.txt", "first version")).unwrap();
        upsert_document(&mut conn, &doc("/a.txt", "second version")).unwrap();

        assert_eq!(document_count(&conn).unwrap(), 1);

        let fts_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts_rows, 1);

        let content: String = conn
            .query_row("SELECT content FROM documents WHERE file_path = '/a.txt'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(content, "second version");
    }

    #[test]
    fn test_upsert_strips_nul_and_caps_name() {
        let mut conn = setup_test_db();
        let mut d = doc("/b.txt", "nul\0inside");
        d.file_name = "n".repeat(MAX_NAME_CHARS + 50);
        d.file_type = String::new();
        upsert_document(&mut conn, &d).unwrap();

        let (content, name, file_type): (String, String, String) = conn
            .query_row(
                "SELECT content, file_name, file_type FROM documents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(content, "nulinside");
        assert_eq!(name.chars().count(), MAX_NAME_CHARS);
        assert_eq!(file_type, "unknown");
    }

    #[test]
    fn test_upsert_with_retry_succeeds() {
        let mut conn = setup_test_db();
        upsert_with_retry(&mut conn, &doc("/c.txt", "content")).unwrap();
        assert_eq!(document_hash(&conn, "/c.txt").unwrap(), Some("hash".to_string()));
    }

    #[test]
    fn test_is_busy() {
        let busy = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(5), None);
        assert!(is_busy(&busy));
        assert!(!is_busy(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_delete_document() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/d.txt", "to be removed")).unwrap();

        assert!(delete_document(&mut conn, "/d.txt").unwrap());
        assert!(!delete_document(&mut conn, "/d.txt").unwrap());
        assert_eq!(document_count(&conn).unwrap(), 0);
        assert_eq!(document_hash(&conn, "/d.txt").unwrap(), None);
    }

    #[test]
    fn test_search_fts_substring() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/q1.txt", "quarterly revenue summary")).unwrap();
        upsert_document(&mut conn, &doc("/misc.txt", "nothing relevant here")).unwrap();

        let forms = QueryForms::new("revenue");
        let hits = search_shard(&conn, &forms, 10, 3).unwrap();

        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.file_path == "/q1.txt"));
        assert_eq!(hits[0].layer, Layer::Complete { shard: 3 });
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].preview, "quarterly revenue summary");
    }

    #[test]
    fn test_search_japanese_trigram() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/jp.txt", "全文検索システムの設計書")).unwrap();

        let forms = QueryForms::new("検索シス");
        let hits = search_shard(&conn, &forms, 10, 0).unwrap();
        assert_eq!(hits[0].file_path, "/jp.txt");
    }

    #[test]
    fn test_search_short_pattern_uses_like() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/short.txt", "an xy pair")).unwrap();

        let forms = QueryForms::new("xy");
        let hits = search_shard(&conn, &forms, 10, 0).unwrap();
        assert_eq!(hits.len(), 1);
        let expected = 1.5 + 0.2 * forms.patterns.len() as f64;
        assert!((hits[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("5%"), "%5\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_fts_phrase_escapes_quotes() {
        assert_eq!(fts_phrase("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_search_quote_in_query_does_not_fail() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/q.txt", "he said \"hello\" twice")).unwrap();
        let forms = QueryForms::new("\"hello\"");
        let hits = search_shard(&conn, &forms, 10, 0).unwrap();
        assert!(hits.iter().any(|h| h.file_path == "/q.txt"));
    }

    #[test]
    fn test_shard_stats() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/a.txt", "aaa")).unwrap();
        upsert_document(&mut conn, &doc("/b.txt", "bbb")).unwrap();
        let mut pdf = doc("/c.pdf", "ccc");
        pdf.file_type = ".pdf".to_string();
        upsert_document(&mut conn, &pdf).unwrap();

        let stats = shard_stats(&conn).unwrap();
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.type_counts.get(".txt"), Some(&2));
        assert_eq!(stats.type_counts.get(".pdf"), Some(&1));
    }

    #[test]
    fn test_optimize_shard() {
        let mut conn = setup_test_db();
        upsert_document(&mut conn, &doc("/a.txt", "optimize me")).unwrap();
        optimize_shard(&conn).unwrap();
        assert_eq!(document_count(&conn).unwrap(), 1);
    }
}
