//! The set of shard databases forming the complete layer.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::{open_shard, ops, DocumentRecord, Shard, ShardStats};
use crate::config::DataLayout;
use crate::search::{dedup_by_score, SearchHit};
use crate::text::QueryForms;
use crate::{AppError, Result};

/// Extra rows fetched from each shard on top of its even share.
const PER_SHARD_SLACK: usize = 20;

/// Stable shard index for a path: first 8 bytes of SHA-256 modulo `count`.
pub fn shard_index(file_path: &str, count: usize) -> usize {
    let digest = Sha256::digest(file_path.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % count.max(1) as u64) as usize
}

/// Number of shards already on disk: one past the highest
/// `complete_search_db_{i}.db` index, or 0 when there are none.
pub fn existing_shard_count(layout: &DataLayout) -> Result<usize> {
    let entries = match std::fs::read_dir(layout.storage_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    for entry in entries {
        let name = entry?.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix("complete_search_db_"))
            .and_then(|n| n.strip_suffix(".db"))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(index) = index {
            count = count.max(index + 1);
        }
    }
    Ok(count)
}

/// Aggregated statistics over every shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStatistics {
    pub shard_count: usize,
    /// Shards whose statistics could be read
    pub valid_shards: usize,
    pub total_files: i64,
    pub type_distribution: BTreeMap<String, i64>,
    /// Sum of shard file sizes on disk
    pub storage_bytes: u64,
    /// Per-shard `(index, stats)` for the readable shards
    pub shards: Vec<(usize, ShardStats)>,
}

/// All shard databases, each behind its own lock.
pub struct ShardSet {
    paths: Vec<PathBuf>,
    shards: Vec<Mutex<Shard>>,
}

impl ShardSet {
    /// Open the shards under the layout's storage directory.
    ///
    /// `count` only sizes a new store. When shard files already exist
    /// their count wins, since paths are routed by it. Shards are opened
    /// in parallel. Any shard that fails to open fails the whole set.
    pub fn open(layout: &DataLayout, count: usize) -> Result<Self> {
        let requested = count.max(1);
        let existing = existing_shard_count(layout)?;
        let count = if existing == 0 { requested } else { existing };
        if count != requested {
            tracing::warn!(
                "Keeping {} existing shard(s) instead of the configured {}; clear the store to reshard",
                count,
                requested
            );
        }
        std::fs::create_dir_all(layout.storage_dir())?;

        let paths: Vec<PathBuf> = (0..count).map(|i| layout.shard_path(i)).collect();
        let opened: Vec<Result<Shard>> = paths
            .par_iter()
            .enumerate()
            .map(|(i, path)| open_shard(i, path))
            .collect();

        let mut shards = Vec::with_capacity(count);
        for shard in opened {
            shards.push(Mutex::new(shard?));
        }

        tracing::info!("Opened {} shard(s) in {:?}", count, layout.storage_dir());
        Ok(Self { paths, shards })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shard_for(&self, file_path: &str) -> usize {
        shard_index(file_path, self.len())
    }

    fn lock(&self, index: usize) -> Result<MutexGuard<'_, Shard>> {
        self.shards[index]
            .lock()
            .map_err(|_| AppError::Database(format!("Shard {} lock poisoned", index)))
    }

    /// Write a document to its shard.
    ///
    /// Returns `false` when the stored content hash already matches and
    /// nothing was written.
    pub fn store(&self, doc: &DocumentRecord) -> Result<bool> {
        let index = self.shard_for(&doc.file_path);
        let mut shard = self.lock(index)?;

        if ops::document_hash(shard.conn(), &doc.file_path)?.as_deref() == Some(doc.hash.as_str())
        {
            tracing::trace!("Unchanged, not rewriting {}", doc.file_path);
            return Ok(false);
        }

        ops::upsert_with_retry(shard.conn_mut(), doc)?;
        Ok(true)
    }

    /// Remove a document from its shard.
    pub fn remove(&self, file_path: &str) -> Result<bool> {
        let index = self.shard_for(file_path);
        let mut shard = self.lock(index)?;
        ops::delete_document(shard.conn_mut(), file_path)
    }

    /// Search every shard in parallel and merge.
    ///
    /// Each shard returns at most `max_results / N + 20` rows. Results are
    /// deduplicated by path keeping the best score, then truncated. A
    /// failing shard is logged and skipped.
    pub fn search(&self, forms: &QueryForms, max_results: usize) -> Vec<SearchHit> {
        if forms.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let per_shard = max_results / self.len() + PER_SHARD_SLACK;
        let hits: Vec<SearchHit> = (0..self.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let result = self
                    .lock(i)
                    .and_then(|shard| ops::search_shard(shard.conn(), forms, per_shard, i));
                match result {
                    Ok(hits) => hits,
                    Err(e) => {
                        tracing::warn!("Shard {} search failed: {}", i, e);
                        Vec::new()
                    }
                }
            })
            .collect();

        let mut merged = dedup_by_score(hits);
        merged.truncate(max_results);
        merged
    }

    /// Collect statistics from every shard.
    pub fn statistics(&self) -> StoreStatistics {
        let per_shard: Vec<Option<(usize, ShardStats, u64)>> = (0..self.len())
            .into_par_iter()
            .map(|i| {
                let stats = self.lock(i).and_then(|shard| ops::shard_stats(shard.conn()));
                match stats {
                    Ok(stats) => {
                        let bytes = std::fs::metadata(&self.paths[i])
                            .map(|m| m.len())
                            .unwrap_or(0);
                        Some((i, stats, bytes))
                    }
                    Err(e) => {
                        tracing::warn!("Shard {} statistics failed: {}", i, e);
                        None
                    }
                }
            })
            .collect();

        let mut total = StoreStatistics {
            shard_count: self.len(),
            ..Default::default()
        };

        for (index, stats, bytes) in per_shard.into_iter().flatten() {
            total.valid_shards += 1;
            total.total_files += stats.file_count;
            total.storage_bytes += bytes;
            for (file_type, count) in &stats.type_counts {
                *total.type_distribution.entry(file_type.clone()).or_insert(0) += count;
            }
            total.shards.push((index, stats));
        }

        total
    }

    /// Optimize every shard. Returns how many succeeded.
    pub fn optimize(&self) -> usize {
        let succeeded = (0..self.len())
            .into_par_iter()
            .filter(|&i| {
                match self.lock(i).and_then(|shard| ops::optimize_shard(shard.conn())) {
                    Ok(()) => {
                        tracing::info!("Shard {} optimized", i);
                        true
                    }
                    Err(e) => {
                        tracing::warn!("Shard {} optimize failed: {}", i, e);
                        false
                    }
                }
            })
            .count();

        tracing::info!("Optimized {}/{} shard(s)", succeeded, self.len());
        succeeded
    }
}
