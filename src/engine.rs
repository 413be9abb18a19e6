//! The search engine: three layers behind one API.
//!
//! A freshly indexed file is searchable immediately through the
//! immediate layer. The scheduler later promotes it to the hot layer and
//! writes it to its shard in the complete layer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, UNIX_EPOCH};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::cache::{CacheStatistics, FileMeta, TieredCache};
use crate::config::{AppConfig, DataLayout};
use crate::db::{existing_shard_count, DocumentRecord, ShardSet, StoreStatistics};
use crate::extract::ContentExtractor;
use crate::indexer::{
    collect_files, is_ignored_name, IndexReport, Job, ProgressTracker, Scheduler, SizeCategory,
};
use crate::search::{matches_extension, rank_by_layer, ParsedQuery, SearchHit};
use crate::system::{optimal_shard_count, optimal_thread_count, HardwareProfile};
use crate::text::QueryForms;
use crate::{AppError, Result};

/// Searches between optimisation checkpoints.
const OPTIMIZATION_INTERVAL: u64 = 1_000;

/// Growth factor of the fetch size while query filters reject hits.
const FILTER_FETCH_FACTOR: usize = 4;

/// Largest fetch, as a multiple of the requested result count.
const FILTER_FETCH_LIMIT: usize = 256;

/// Search and indexing counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCounters {
    pub indexed_files: u64,
    pub search_count: u64,
    pub immediate_hits: u64,
    pub hot_hits: u64,
    pub complete_hits: u64,
    pub total_search_secs: f64,
    pub avg_search_secs: f64,
    pub optimization_count: u64,
    pub error_count: u64,
}

impl SearchCounters {
    fn record_search(&mut self, elapsed: Duration) {
        self.search_count += 1;
        self.total_search_secs += elapsed.as_secs_f64();
        self.avg_search_secs = self.total_search_secs / self.search_count as f64;
    }
}

/// Everything `stats` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatistics {
    pub counters: SearchCounters,
    pub cache: CacheStatistics,
    pub store: StoreStatistics,
    /// Promotions and shard writes not yet run
    pub pending_jobs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationStatistics {
    pub optimization_count: u64,
    pub error_count: u64,
    pub indexing_in_progress: bool,
    pub shard_count: usize,
    pub worker_threads: usize,
}

/// Clears the indexing flag when dropped.
struct IndexingGuard<'a>(&'a AtomicBool);

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn unix_seconds(time: std::time::SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

pub struct SearchEngine {
    layout: DataLayout,
    cache: Arc<TieredCache>,
    shards: Arc<ShardSet>,
    extractor: ContentExtractor,
    scheduler: Scheduler,
    counters: Arc<Mutex<SearchCounters>>,
    worker_threads: usize,
    hot_ttl: Duration,
    promotion_delay: Duration,
    persist_delay: Duration,
    indexing: AtomicBool,
    cancelled: AtomicBool,
    shut_down: AtomicBool,
}

impl SearchEngine {
    /// Open the shards, load the hot cache and start the scheduler.
    ///
    /// Worker threads come from the configuration, or are sized from the
    /// detected hardware when unset. The shard count is taken from the
    /// shard files already on disk, and only a new store is sized from the
    /// configuration or hardware.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let layout = config.layout();
        std::fs::create_dir_all(layout.root())?;

        let existing_shards = existing_shard_count(&layout)?;
        let hardware = match (config.shard_count, config.worker_threads) {
            (_, None) => Some(HardwareProfile::detect()),
            (None, Some(_)) if existing_shards == 0 => Some(HardwareProfile::detect()),
            _ => None,
        };
        // Paths are routed by shard count, so an existing store keeps its own
        let shard_count = if existing_shards > 0 {
            if let Some(configured) = config.shard_count.filter(|&n| n != existing_shards) {
                tracing::warn!(
                    "Configured for {} shards but {} exist; keeping {}",
                    configured,
                    existing_shards,
                    existing_shards
                );
            }
            existing_shards
        } else {
            config
                .shard_count
                .or_else(|| hardware.as_ref().map(optimal_shard_count))
                .unwrap_or(2)
                .max(1)
        };
        let worker_threads = config
            .worker_threads
            .or_else(|| hardware.as_ref().map(optimal_thread_count))
            .unwrap_or(4)
            .max(1);

        let shards = Arc::new(ShardSet::open(&layout, shard_count)?);
        tracing::info!(
            "Opened search engine at {:?}: {} shards, {} workers",
            layout.root(),
            shards.len(),
            worker_threads
        );

        let cache = Arc::new(TieredCache::new(config.immediate_capacity, config.hot_capacity));
        let hot_ttl = Duration::from_secs(config.hot_ttl_days * 24 * 60 * 60);

        if let Err(e) = cache.load(&layout.cache_dir(), hot_ttl) {
            tracing::warn!("Starting with an empty hot cache: {}", e);
        }

        let counters = Arc::new(Mutex::new(SearchCounters::default()));
        let scheduler = {
            let cache = Arc::clone(&cache);
            let shards = Arc::clone(&shards);
            let counters = Arc::clone(&counters);
            Scheduler::start(move |job| run_job(job, &cache, &shards, &counters))?
        };

        Ok(Self {
            layout,
            cache,
            shards,
            extractor: ContentExtractor::new(&config.ocr),
            scheduler,
            counters,
            worker_threads,
            hot_ttl,
            promotion_delay: Duration::from_millis(config.hot_promotion_delay_ms),
            persist_delay: Duration::from_millis(config.persist_delay_ms),
            indexing: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn extractor(&self) -> &ContentExtractor {
        &self.extractor
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn with_counters(&self, f: impl FnOnce(&mut SearchCounters)) {
        if let Ok(mut counters) = self.counters.lock() {
            f(&mut counters);
        }
    }

    /// Return the first layer with results: immediate (or a remembered
    /// result), then hot, then complete.
    pub fn quick_search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let start = Instant::now();
        let forms = QueryForms::new(query);

        let mut immediate = self.cache.search_immediate(&forms);
        if immediate.is_empty() {
            if let Some(remembered) = self.cache.recall(query) {
                immediate = remembered;
            }
        }
        if !immediate.is_empty() {
            immediate.truncate(max_results);
            self.with_counters(|c| {
                c.immediate_hits += 1;
                c.record_search(start.elapsed());
            });
            return immediate;
        }

        let mut hot = self.cache.search_hot(&forms);
        if !hot.is_empty() {
            self.cache.remember(query, &hot);
            hot.truncate(max_results);
            self.with_counters(|c| {
                c.hot_hits += 1;
                c.record_search(start.elapsed());
            });
            return hot;
        }

        let complete = self.shards.search(&forms, max_results);
        if !complete.is_empty() {
            self.cache.remember(query, &complete);
        }
        self.with_counters(|c| {
            c.complete_hits += 1;
            c.record_search(start.elapsed());
        });
        complete
    }

    /// Merge all three layers.
    ///
    /// While indexing, the cache layers are preferred and the shards are
    /// only consulted when the caches return fewer than `max / 4` hits.
    /// `ext_filter` is `all` or an extension such as `pdf` / `.pdf`.
    pub fn unified_search(&self, query: &str, max_results: usize, ext_filter: &str) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let start = Instant::now();
        let forms = QueryForms::new(query);
        let indexing = self.is_indexing();
        let mut hits: Vec<SearchHit> = Vec::new();

        if indexing {
            hits.extend(self.cache.search_immediate(&forms).into_iter().take(max_results / 2));
            hits.extend(self.cache.search_hot(&forms).into_iter().take(max_results / 2));
            if hits.len() < max_results / 4 {
                hits.extend(self.shards.search(&forms, max_results / 4));
            }
        } else {
            hits.extend(self.shards.search(&forms, max_results / 2));
            hits.extend(self.cache.search_immediate(&forms).into_iter().take(max_results / 4));
            hits.extend(self.cache.search_hot(&forms).into_iter().take(max_results / 4));
        }

        let gathered = hits.len();
        let mut ranked = rank_by_layer(hits);
        ranked.retain(|hit| matches_extension(hit, ext_filter));
        ranked.truncate(max_results);

        let elapsed = start.elapsed();
        self.with_counters(|c| {
            c.record_search(elapsed);
            if !indexing && c.search_count % OPTIMIZATION_INTERVAL == 0 {
                c.optimization_count += 1;
                tracing::info!("Optimisation checkpoint after {} searches", c.search_count);
            }
        });

        tracing::debug!(
            "Search {:?}: {} hits ({} gathered) in {:.4}s [filter: {}]{}",
            query,
            ranked.len(),
            gathered,
            elapsed.as_secs_f64(),
            ext_filter,
            if indexing { " while indexing" } else { "" }
        );

        ranked
    }

    /// Search with a parsed query and apply its filters.
    ///
    /// Filters run after the layers are searched, so hits are fetched in
    /// growing batches until `max_results` pass, the layers stop returning
    /// new hits, or the fetch limit is reached.
    pub fn search_parsed(
        &self,
        parsed: &ParsedQuery,
        max_results: usize,
        ext_filter: &str,
        quick: bool,
    ) -> Vec<SearchHit> {
        if max_results == 0 {
            return Vec::new();
        }

        let run = |fetch: usize| {
            if quick {
                let mut hits = self.quick_search(&parsed.text, fetch);
                hits.retain(|hit| matches_extension(hit, ext_filter));
                hits
            } else {
                self.unified_search(&parsed.text, fetch, ext_filter)
            }
        };

        if parsed.filters.is_empty() {
            return run(max_results);
        }

        let ceiling = max_results.saturating_mul(FILTER_FETCH_LIMIT);
        let mut fetch = max_results.saturating_mul(FILTER_FETCH_FACTOR);
        let mut previous = 0;
        loop {
            let hits = run(fetch);
            let gathered = hits.len();
            let mut passed = parsed.apply(hits);

            if passed.len() >= max_results || gathered <= previous || fetch >= ceiling {
                passed.truncate(max_results);
                return passed;
            }

            tracing::debug!(
                "{} of {} hits passed filters, fetching more",
                passed.len(),
                gathered
            );
            previous = gathered;
            fetch = fetch.saturating_mul(FILTER_FETCH_FACTOR).min(ceiling);
        }
    }

    /// Index one file into the immediate layer and schedule its promotion
    /// and persistence.
    ///
    /// Returns `Ok(false)` for skipped, missing or empty files, while a
    /// cancelled directory pass is winding down, and after shutdown.
    pub fn index_file(&self, path: &Path) -> Result<bool> {
        if self.shut_down.load(Ordering::SeqCst)
            || (self.is_indexing() && self.cancelled.load(Ordering::SeqCst))
        {
            return Ok(false);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_ignored_name(&name) {
            tracing::debug!("Skipping system file {}", name);
            return Ok(false);
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(false),
            Err(e) => {
                tracing::warn!("Cannot index {}: {}", path.display(), e);
                return Ok(false);
            }
        };

        let content = self.extractor.extract(path)?;
        if content.trim().is_empty() {
            tracing::debug!("No content extracted from {}", path.display());
            return Ok(false);
        }

        let file_path = path.to_string_lossy().into_owned();
        let meta = FileMeta::from_path(path);
        let hash = content_hash(&content);
        let modified = metadata.modified().map(unix_seconds).unwrap_or(0.0);

        self.cache.add_immediate(&file_path, &content, &meta)?;

        let record = DocumentRecord::new(
            &file_path,
            &content,
            &meta.file_type,
            metadata.len(),
            modified,
            &hash,
        );
        self.scheduler.schedule(
            self.promotion_delay,
            Job::PromoteToHot {
                file_path: file_path.clone(),
                content,
            },
        )?;
        self.scheduler.schedule(self.persist_delay, Job::Persist(record))?;

        self.with_counters(|c| c.indexed_files += 1);
        tracing::debug!("Indexed {}", file_path);
        Ok(true)
    }

    /// Index every supported file under `dir`, light files first.
    pub fn index_directory(&self, dir: &Path, progress: &ProgressTracker) -> Result<IndexReport> {
        if self.indexing.swap(true, Ordering::SeqCst) {
            return Err(AppError::Indexing("Indexing is already running".to_string()));
        }
        let _guard = IndexingGuard(&self.indexing);
        self.cancelled.store(false, Ordering::SeqCst);

        let start = Instant::now();
        progress.reset();

        let files = match collect_files(dir, &self.cancelled) {
            Ok(files) => files,
            Err(AppError::Cancelled) => {
                self.cancelled.store(false, Ordering::SeqCst);
                return Ok(IndexReport {
                    cancelled: true,
                    elapsed_secs: start.elapsed().as_secs_f64(),
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };
        progress.set_total(files.total(), files.counts());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .thread_name(|i| format!("livefind-index-{}", i))
            .build()
            .map_err(|e| AppError::Indexing(format!("Failed to build worker pool: {}", e)))?;

        let succeeded = AtomicUsize::new(0);

        for category in SizeCategory::ALL {
            let batch = files.category(category);
            if batch.is_empty() {
                continue;
            }
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            tracing::info!("Indexing {} {} files", batch.len(), category);

            pool.install(|| {
                batch.par_iter().for_each(|path| {
                    if self.cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    let ok = match self.index_file(path) {
                        Ok(ok) => ok,
                        Err(e) => {
                            tracing::warn!("Failed to index {}: {}", path.display(), e);
                            self.with_counters(|c| c.error_count += 1);
                            false
                        }
                    };
                    if ok {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    progress.update(&path.to_string_lossy(), category, ok);
                });
            });
        }

        let elapsed = start.elapsed().as_secs_f64();
        let success_count = succeeded.into_inner();
        let report = IndexReport {
            success_count,
            total_files: files.total(),
            elapsed_secs: elapsed,
            files_per_second: if elapsed > 0.0 {
                success_count as f64 / elapsed
            } else {
                0.0
            },
            cancelled: self.cancelled.swap(false, Ordering::SeqCst),
        };

        tracing::info!(
            "Indexed {}/{} files in {:.2}s ({:.1} files/s){}",
            report.success_count,
            report.total_files,
            report.elapsed_secs,
            report.files_per_second,
            if report.cancelled { ", cancelled" } else { "" }
        );

        Ok(report)
    }

    /// Ask a running `index_directory` to stop. Does nothing when idle.
    ///
    /// The request lasts until that run returns.
    pub fn cancel_indexing(&self) {
        if !self.is_indexing() {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        tracing::info!("Indexing cancellation requested");
    }

    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            counters: self.counters.lock().map(|c| c.clone()).unwrap_or_default(),
            cache: self.cache.statistics(),
            store: self.shards.statistics(),
            pending_jobs: self.scheduler.pending(),
        }
    }

    pub fn optimization_statistics(&self) -> OptimizationStatistics {
        let counters = self.counters.lock().map(|c| c.clone()).unwrap_or_default();
        OptimizationStatistics {
            optimization_count: counters.optimization_count,
            error_count: counters.error_count,
            indexing_in_progress: self.is_indexing(),
            shard_count: self.shards.len(),
            worker_threads: self.worker_threads,
        }
    }

    /// Write the hot layer to disk.
    pub fn save_caches(&self) -> Result<usize> {
        self.cache.save(&self.layout.cache_dir())
    }

    /// Reload the hot layer from disk, dropping expired entries.
    pub fn reload_caches(&self) -> Result<usize> {
        self.cache.load(&self.layout.cache_dir(), self.hot_ttl)
    }

    /// Empty both cache layers and delete their files. Shards are kept.
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear(&self.layout.cache_dir())
    }

    /// Optimize every shard. Returns how many succeeded.
    pub fn optimize_databases(&self) -> usize {
        let optimized = self.shards.optimize();
        tracing::info!("Optimized {}/{} shards", optimized, self.shards.len());
        optimized
    }

    /// Run every scheduled promotion and shard write now.
    pub fn flush_pending(&self) -> Result<()> {
        self.scheduler.flush()
    }

    /// Cancel indexing, run pending jobs, save the hot cache and stop the
    /// scheduler. Later calls do nothing.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Shutting down search engine");

        self.cancelled.store(true, Ordering::SeqCst);
        self.scheduler.shutdown();
        let saved = self.save_caches();
        self.cache.close();

        saved.map(|count| {
            tracing::info!("Search engine stopped ({} hot entries saved)", count);
        })
    }
}

impl Drop for SearchEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Shutdown failed: {}", e);
        }
    }
}

fn run_job(job: Job, cache: &TieredCache, shards: &ShardSet, counters: &Mutex<SearchCounters>) {
    let result = match job {
        Job::PromoteToHot { file_path, content } => cache
            .promote_to_hot(&file_path, &content)
            .map(|()| tracing::trace!("Promoted {}", file_path)),
        Job::Persist(record) => shards.store(&record).map(|written| {
            if written {
                tracing::debug!("Persisted {}", record.file_path);
            }
        }),
    };

    if let Err(e) = result {
        tracing::warn!("Scheduled job failed: {}", e);
        if let Ok(mut c) = counters.lock() {
            c.error_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Layer;
    use tempfile::TempDir;

    fn engine(dir: &Path) -> SearchEngine {
        let config = AppConfig {
            data_dir: dir.join("data"),
            shard_count: Some(2),
            worker_threads: Some(2),
            hot_promotion_delay_ms: 60_000,
            persist_delay_ms: 60_000,
            ..AppConfig::default()
        };
        SearchEngine::open(&config).unwrap()
    }

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_indexed_file_is_immediately_searchable() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        let doc = write(dir.path(), "memo.txt", "quarterly revenue forecast");

        assert!(engine.index_file(&doc).unwrap());

        let hits = engine.quick_search("revenue", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].layer, Layer::Immediate);
        assert_eq!(engine.statistics().counters.immediate_hits, 1);
    }

    #[test]
    fn test_flush_moves_file_to_hot_and_complete() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        let doc = write(dir.path(), "plan.txt", "migration plan for the archive");

        engine.index_file(&doc).unwrap();
        assert_eq!(engine.statistics().pending_jobs, 2);
        engine.flush_pending().unwrap();

        let stats = engine.statistics();
        assert_eq!(stats.cache.immediate_entries, 0);
        assert_eq!(stats.cache.hot_entries, 1);
        assert_eq!(stats.store.total_files, 1);

        let hits = engine.unified_search("migration", 10, "all");
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0].layer, Layer::Complete { .. }));
    }

    #[test]
    fn test_skips_system_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());

        let hidden = write(dir.path(), "._fork.txt", "resource fork");
        let empty = write(dir.path(), "empty.txt", "   ");

        assert!(!engine.index_file(&hidden).unwrap());
        assert!(!engine.index_file(&empty).unwrap());
        assert!(!engine.index_file(&dir.path().join("missing.txt")).unwrap());
    }

    #[test]
    fn test_blank_query_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        assert!(engine.quick_search("   ", 10).is_empty());
        assert!(engine.unified_search("", 10, "all").is_empty());
        assert_eq!(engine.statistics().counters.search_count, 0);
    }

    #[test]
    fn test_unified_search_extension_filter() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        let txt = write(dir.path(), "a.txt", "shared keyword alpha");
        let md = write(dir.path(), "b.md", "shared keyword beta");

        engine.index_file(&txt).unwrap();
        engine.index_file(&md).unwrap();

        assert_eq!(engine.unified_search("keyword", 10, "all").len(), 2);
        let only_txt = engine.unified_search("keyword", 10, "txt");
        assert_eq!(only_txt.len(), 1);
        assert!(only_txt[0].file_path.ends_with("a.txt"));
    }

    #[test]
    fn test_index_directory_report() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("nested")).unwrap();
        write(&docs, "one.txt", "first document");
        write(&docs.join("nested"), "two.txt", "second document");
        write(&docs, "skip.png", "not collected");

        let engine = engine(dir.path());
        let progress = ProgressTracker::new();
        let report = engine.index_directory(&docs, &progress).unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.success_count, 2);
        assert!(!report.cancelled);
        assert!(!engine.is_indexing());

        let info = progress.snapshot();
        assert_eq!(info.processed_files, 2);
        assert_eq!(info.successful_files, 2);
    }

    #[test]
    fn test_cancel_while_idle_does_not_block_indexing() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        let doc = write(dir.path(), "late.txt", "still indexed");

        engine.cancel_indexing();
        assert!(engine.index_file(&doc).unwrap());
    }

    #[test]
    fn test_cancelled_run_clears_request() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        for i in 0..200 {
            write(&docs, &format!("{}.txt", i), "bulk document body");
        }
        let extra = write(dir.path(), "after.txt", "indexed after the run");

        let engine = engine(dir.path());
        let progress = ProgressTracker::new();
        std::thread::scope(|scope| {
            let run = scope.spawn(|| engine.index_directory(&docs, &progress));
            while !run.is_finished() && !engine.is_indexing() {
                std::thread::yield_now();
            }
            engine.cancel_indexing();
            run.join().unwrap().unwrap();
        });

        assert!(!engine.is_indexing());
        assert!(engine.index_file(&extra).unwrap());
    }

    #[test]
    fn test_index_file_after_shutdown_is_skipped() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        let doc = write(dir.path(), "closed.txt", "too late");

        engine.shutdown().unwrap();
        assert!(!engine.index_file(&doc).unwrap());
    }

    #[test]
    fn test_search_parsed_fetches_past_limit_for_filters() {
        let dir = TempDir::new().unwrap();
        let noise = dir.path().join("noise");
        let wanted = dir.path().join("wanted");
        std::fs::create_dir_all(&noise).unwrap();
        std::fs::create_dir_all(&wanted).unwrap();

        let engine = engine(dir.path());
        for i in 0..10 {
            let doc = write(&noise, &format!("{}.txt", i), "ledger ledger ledger");
            engine.index_file(&doc).unwrap();
        }
        let filler = "unrelated words ".repeat(200);
        let target = write(&wanted, "deep.txt", &format!("ledger {}", filler));
        engine.index_file(&target).unwrap();
        engine.flush_pending().unwrap();

        let parsed = crate::search::parse_query("ledger path:wanted").unwrap();
        assert!(parsed.apply(engine.unified_search(&parsed.text, 2, "all")).is_empty());

        let hits = engine.search_parsed(&parsed, 2, "all", false);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].file_path.ends_with("deep.txt"));

        let quick = engine.search_parsed(&parsed, 2, "all", true);
        assert_eq!(quick.len(), 1);
    }

    #[test]
    fn test_search_parsed_without_filters_respects_limit() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        for i in 0..6 {
            let doc = write(dir.path(), &format!("{}.txt", i), "common phrase");
            engine.index_file(&doc).unwrap();
        }
        engine.flush_pending().unwrap();

        let parsed = crate::search::parse_query("common").unwrap();
        let hits = engine.search_parsed(&parsed, 4, "all", false);
        assert!(!hits.is_empty() && hits.len() <= 4);
        assert_eq!(engine.statistics().counters.search_count, 1);
        assert!(engine.search_parsed(&parsed, 0, "all", false).is_empty());
    }

    #[test]
    fn test_shutdown_persists_pending_work() {
        let dir = TempDir::new().unwrap();
        let doc = write(dir.path(), "keep.txt", "durable content survives restart");

        {
            let engine = engine(dir.path());
            engine.index_file(&doc).unwrap();
            engine.shutdown().unwrap();
            engine.shutdown().unwrap();
        }

        let reopened = engine(dir.path());
        let stats = reopened.statistics();
        assert_eq!(stats.store.total_files, 1);
        assert_eq!(stats.cache.hot_entries, 1);
        assert_eq!(reopened.quick_search("durable", 10)[0].layer, Layer::Hot);
    }

    #[test]
    fn test_reopen_with_other_shard_count_keeps_store() {
        let dir = TempDir::new().unwrap();
        let docs: Vec<_> = (0..12)
            .map(|i| write(dir.path(), &format!("{}.txt", i), "archived invoice record"))
            .collect();

        {
            let engine = engine(dir.path());
            for doc in &docs {
                engine.index_file(doc).unwrap();
            }
            engine.shutdown().unwrap();
        }

        let config = AppConfig {
            data_dir: dir.path().join("data"),
            shard_count: Some(5),
            worker_threads: Some(2),
            ..AppConfig::default()
        };
        let reopened = SearchEngine::open(&config).unwrap();
        reopened.clear_cache().unwrap();

        assert_eq!(reopened.shard_count(), 2);
        assert_eq!(reopened.statistics().store.total_files, 12);
        assert_eq!(reopened.unified_search("invoice", 100, "all").len(), 12);
    }

    #[test]
    fn test_optimization_checkpoint() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        for _ in 0..OPTIMIZATION_INTERVAL {
            engine.unified_search("nothing", 5, "all");
        }
        let stats = engine.optimization_statistics();
        assert_eq!(stats.optimization_count, 1);
        assert_eq!(stats.shard_count, 2);
        assert!(!stats.indexing_in_progress);
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
