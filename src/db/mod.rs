//! Database module - sharded SQLite full-text store.
//!
//! The complete layer is split across N SQLite files. Each shard is an
//! independent database with the same schema; [`ShardSet`] routes writes
//! by path hash and fans searches out across all shards.

mod ops;
pub mod schema;
mod shards;

pub use ops::*;
pub use shards::{existing_shard_count, shard_index, ShardSet, StoreStatistics};

use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::{AppError, Result};

/// One open shard database.
pub struct Shard {
    index: usize,
    path: PathBuf,
    conn: Connection,
}

impl Shard {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Get a mutable reference to the underlying connection.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Open a shard database with WAL mode and tuned PRAGMAs.
///
/// Creates the parent directory if needed and initializes the schema on
/// first use. An existing shard that already has a `documents` table is
/// reused as-is.
pub fn open_shard(index: usize, path: &Path) -> Result<Shard> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path).map_err(|e| {
        AppError::Database(format!("Failed to open shard {}: {}", index, e))
    })?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Database(format!("Failed to set journal_mode: {}", e)))?;

    // NORMAL is safe in WAL mode
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(|e| AppError::Database(format!("Failed to set synchronous: {}", e)))?;

    conn.pragma_update(None, "temp_store", "MEMORY")
        .map_err(|e| AppError::Database(format!("Failed to set temp_store: {}", e)))?;

    // 20MB page cache per shard (negative value = KB)
    conn.pragma_update(None, "cache_size", -20000i32)
        .map_err(|e| AppError::Database(format!("Failed to set cache_size: {}", e)))?;

    conn.pragma_update(None, "busy_timeout", 30000i32)
        .map_err(|e| AppError::Database(format!("Failed to set busy_timeout: {}", e)))?;

    if schema::has_documents_table(&conn)? {
        tracing::debug!("Reusing shard {} at {:?}", index, path);
    } else {
        schema::init(&conn)?;
        tracing::debug!("Created shard {} at {:?}", index, path);
    }

    Ok(Shard {
        index,
        path: path.to_path_buf(),
        conn,
    })
}
