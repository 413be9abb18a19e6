//! In-memory layers of the search engine.
//!
//! The immediate layer holds a short preview of every freshly indexed file
//! and is never persisted. The hot layer holds the first 10 000 characters
//! of content and survives restarts through [`persist`]. A separate query
//! memo remembers recent results from the slower layers.

pub mod persist;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::db::unix_now;
use crate::search::{Layer, SearchHit};
use crate::text::{safe_truncate, QueryForms};
use crate::{AppError, Result};

/// Characters of content kept in the immediate layer.
pub const IMMEDIATE_PREVIEW_CHARS: usize = 500;

/// Characters of content kept in the hot layer.
pub const HOT_CONTENT_CHARS: usize = 10_000;

/// Characters of preview returned with a hit.
const HIT_PREVIEW_CHARS: usize = 200;

/// Above these sizes a layer scan runs on the rayon pool.
const PARALLEL_IMMEDIATE: usize = 1_000;
const PARALLEL_HOT: usize = 5_000;

const IMMEDIATE_SCORE: f64 = 1.0;
const HOT_SCORE: f64 = 0.8;

/// File metadata stored alongside cached text.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub file_name: String,
    /// Lowercase extension including the dot
    pub file_type: String,
    pub size: u64,
}

impl FileMeta {
    /// Read metadata from the filesystem. A missing file has size 0.
    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        Self {
            file_name,
            file_type,
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImmediateEntry {
    pub file_path: String,
    pub file_name: String,
    /// First 500 characters of content
    pub preview: String,
    pub file_type: String,
    pub size: u64,
    pub indexed_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotEntry {
    pub file_path: String,
    pub file_name: String,
    /// First 10 000 characters of content
    pub content: String,
    pub file_type: String,
    pub size: u64,
    pub indexed_at: f64,
    /// When the entry left the immediate layer
    #[serde(default)]
    pub promoted_at: Option<f64>,
}

impl HotEntry {
    /// Timestamp used for expiry.
    pub fn cached_at(&self) -> f64 {
        self.promoted_at.unwrap_or(self.indexed_at)
    }
}

/// Entry counts and approximate text volume per layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatistics {
    pub immediate_entries: usize,
    pub hot_entries: usize,
    pub memo_entries: usize,
    pub immediate_mb: f64,
    pub hot_mb: f64,
}

/// Bounded query → results memo, oldest query evicted first.
#[derive(Debug, Default)]
struct QueryMemo {
    results: HashMap<String, Vec<SearchHit>>,
    order: VecDeque<String>,
}

impl QueryMemo {
    fn insert(&mut self, query: String, hits: Vec<SearchHit>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.results.insert(query.clone(), hits).is_none() {
            self.order.push_back(query);
        }
        while self.results.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.results.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn clear(&mut self) {
        self.results.clear();
        self.order.clear();
    }
}

/// Immediate and hot layers plus the query memo.
pub struct TieredCache {
    immediate: RwLock<HashMap<String, ImmediateEntry>>,
    hot: RwLock<HashMap<String, HotEntry>>,
    memo: Mutex<QueryMemo>,
    immediate_capacity: usize,
    hot_capacity: usize,
    closed: AtomicBool,
}

fn poisoned(layer: &str) -> AppError {
    AppError::Cache(format!("{} layer lock poisoned", layer))
}

impl TieredCache {
    pub fn new(immediate_capacity: usize, hot_capacity: usize) -> Self {
        Self {
            immediate: RwLock::new(HashMap::new()),
            hot: RwLock::new(HashMap::new()),
            memo: Mutex::new(QueryMemo::default()),
            immediate_capacity: immediate_capacity.max(1),
            hot_capacity: hot_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a freshly indexed file to the immediate layer.
    ///
    /// When the layer overflows, the oldest tenth (at least one entry) is
    /// evicted by index time.
    pub fn add_immediate(&self, file_path: &str, content: &str, meta: &FileMeta) -> Result<()> {
        let entry = ImmediateEntry {
            file_path: file_path.to_string(),
            file_name: meta.file_name.clone(),
            preview: safe_truncate(content, IMMEDIATE_PREVIEW_CHARS).to_string(),
            file_type: meta.file_type.clone(),
            size: meta.size,
            indexed_at: unix_now(),
        };

        {
            let mut immediate = self.immediate.write().map_err(|_| poisoned("Immediate"))?;
            immediate.insert(file_path.to_string(), entry);

            if immediate.len() > self.immediate_capacity {
                let evict = (self.immediate_capacity / 10).max(1);
                let mut by_age: Vec<(String, f64)> = immediate
                    .iter()
                    .map(|(path, e)| (path.clone(), e.indexed_at))
                    .collect();
                by_age.sort_by(|a, b| a.1.total_cmp(&b.1));
                for (path, _) in by_age.into_iter().take(evict) {
                    immediate.remove(&path);
                }
                tracing::debug!("Immediate layer over capacity, evicted {} entries", evict);
            }
        }

        self.forget_queries();
        Ok(())
    }

    /// Move a file from the immediate layer to the hot layer.
    ///
    /// If the immediate entry is gone, metadata is read from disk. When
    /// the hot layer overflows, the single oldest entry is evicted. Does
    /// nothing once the cache is closed.
    pub fn promote_to_hot(&self, file_path: &str, content: &str) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let base = self
            .immediate
            .write()
            .map_err(|_| poisoned("Immediate"))?
            .remove(file_path);

        let (meta, indexed_at) = match base {
            Some(entry) => (
                FileMeta {
                    file_name: entry.file_name,
                    file_type: entry.file_type,
                    size: entry.size,
                },
                entry.indexed_at,
            ),
            None => (FileMeta::from_path(Path::new(file_path)), unix_now()),
        };

        let entry = HotEntry {
            file_path: file_path.to_string(),
            file_name: meta.file_name,
            content: safe_truncate(content, HOT_CONTENT_CHARS).to_string(),
            file_type: meta.file_type,
            size: meta.size,
            indexed_at,
            promoted_at: Some(unix_now()),
        };

        {
            let mut hot = self.hot.write().map_err(|_| poisoned("Hot"))?;
            hot.insert(file_path.to_string(), entry);

            if hot.len() > self.hot_capacity {
                let oldest = hot
                    .iter()
                    .min_by(|a, b| a.1.indexed_at.total_cmp(&b.1.indexed_at))
                    .map(|(path, _)| path.clone());
                if let Some(path) = oldest {
                    hot.remove(&path);
                }
            }
        }

        self.forget_queries();
        Ok(())
    }

    /// Scan the immediate layer, newest first.
    pub fn search_immediate(&self, forms: &QueryForms) -> Vec<SearchHit> {
        if forms.is_empty() {
            return Vec::new();
        }
        let Ok(immediate) = self.immediate.read() else {
            tracing::warn!("Immediate layer lock poisoned, skipping");
            return Vec::new();
        };

        let entries: Vec<&ImmediateEntry> = immediate.values().collect();
        let check = |entry: &&ImmediateEntry| -> Option<(SearchHit, f64)> {
            let text = format!("{} {}", entry.preview, entry.file_name);
            forms.matches(&text).then(|| {
                let hit = SearchHit {
                    file_path: entry.file_path.clone(),
                    file_name: entry.file_name.clone(),
                    preview: safe_truncate(&text, HIT_PREVIEW_CHARS).to_string(),
                    layer: Layer::Immediate,
                    file_type: entry.file_type.clone(),
                    size: entry.size,
                    score: IMMEDIATE_SCORE,
                };
                (hit, entry.indexed_at)
            })
        };

        let found: Vec<(SearchHit, f64)> = if entries.len() > PARALLEL_IMMEDIATE {
            let chunk = (entries.len() / 8).max(200);
            entries
                .par_chunks(chunk)
                .flat_map_iter(|part| part.iter().filter_map(check))
                .collect()
        } else {
            entries.iter().filter_map(check).collect()
        };

        newest_first(found)
    }

    /// Scan the hot layer, newest first.
    pub fn search_hot(&self, forms: &QueryForms) -> Vec<SearchHit> {
        if forms.is_empty() {
            return Vec::new();
        }
        let Ok(hot) = self.hot.read() else {
            tracing::warn!("Hot layer lock poisoned, skipping");
            return Vec::new();
        };

        let entries: Vec<&HotEntry> = hot.values().collect();
        let check = |entry: &&HotEntry| -> Option<(SearchHit, f64)> {
            let text = format!("{} {}", entry.content, entry.file_name);
            forms.matches(&text).then(|| {
                let hit = SearchHit {
                    file_path: entry.file_path.clone(),
                    file_name: entry.file_name.clone(),
                    preview: safe_truncate(&entry.content, HIT_PREVIEW_CHARS).to_string(),
                    layer: Layer::Hot,
                    file_type: entry.file_type.clone(),
                    size: entry.size,
                    score: HOT_SCORE,
                };
                (hit, entry.indexed_at)
            })
        };

        let found: Vec<(SearchHit, f64)> = if entries.len() > PARALLEL_HOT {
            let chunk = (entries.len() / 8).max(500);
            entries
                .par_chunks(chunk)
                .flat_map_iter(|part| part.iter().filter_map(check))
                .collect()
        } else {
            entries.iter().filter_map(check).collect()
        };

        newest_first(found)
    }

    /// Remember results for a query.
    pub fn remember(&self, query: &str, hits: &[SearchHit]) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(query.to_string(), hits.to_vec(), self.immediate_capacity);
        }
    }

    /// Results previously remembered for a query.
    pub fn recall(&self, query: &str) -> Option<Vec<SearchHit>> {
        self.memo
            .lock()
            .ok()
            .and_then(|memo| memo.results.get(query).cloned())
    }

    fn forget_queries(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.clear();
        }
    }

    /// Write the hot layer to `cache_dir`.
    pub fn save(&self, cache_dir: &Path) -> Result<usize> {
        let snapshot = self.hot.read().map_err(|_| poisoned("Hot"))?.clone();
        let count = persist::save_hot(cache_dir, &snapshot)?;
        tracing::info!("Saved hot cache ({} entries)", count);
        Ok(count)
    }

    /// Replace both layers from disk: immediate starts empty, hot entries
    /// past `ttl` are dropped.
    pub fn load(&self, cache_dir: &Path, ttl: Duration) -> Result<usize> {
        let (entries, expired) = persist::load_hot(cache_dir, ttl, unix_now())?;
        let count = entries.len();

        self.immediate.write().map_err(|_| poisoned("Immediate"))?.clear();
        *self.hot.write().map_err(|_| poisoned("Hot"))? = entries;
        self.forget_queries();

        if expired > 0 {
            tracing::info!("Dropped {} expired hot cache entries", expired);
        }
        tracing::info!("Loaded hot cache ({} entries)", count);
        Ok(count)
    }

    /// Empty both layers and the memo, and delete the cache files.
    pub fn clear(&self, cache_dir: &Path) -> Result<()> {
        self.immediate.write().map_err(|_| poisoned("Immediate"))?.clear();
        self.hot.write().map_err(|_| poisoned("Hot"))?.clear();
        self.forget_queries();
        persist::remove_files(cache_dir)?;
        tracing::info!("Cache cleared");
        Ok(())
    }

    pub fn statistics(&self) -> CacheStatistics {
        let mut stats = CacheStatistics::default();

        if let Ok(immediate) = self.immediate.read() {
            stats.immediate_entries = immediate.len();
            stats.immediate_mb = megabytes(immediate.values().map(|e| e.preview.len()));
        }
        if let Ok(hot) = self.hot.read() {
            stats.hot_entries = hot.len();
            stats.hot_mb = megabytes(hot.values().map(|e| e.content.len()));
        }
        if let Ok(memo) = self.memo.lock() {
            stats.memo_entries = memo.results.len();
        }

        stats
    }

    /// Stop accepting promotions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn newest_first(mut found: Vec<(SearchHit, f64)>) -> Vec<SearchHit> {
    found.sort_by(|a, b| b.1.total_cmp(&a.1));
    found.into_iter().map(|(hit, _)| hit).collect()
}

fn megabytes(sizes: impl Iterator<Item = usize>) -> f64 {
    sizes.sum::<usize>() as f64 / (1024.0 * 1024.0)
}
