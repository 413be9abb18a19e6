//! Directory collection and indexing support.
//!
//! This module walks a folder for supported documents and groups them by
//! size so small files become searchable first. It also hosts the delayed
//! job [`scheduler`] and the shared [`progress`] tracker.

pub mod progress;
pub mod scheduler;

pub use progress::{CategoryCounts, ProgressInfo, ProgressTracker, SizeCategory};
pub use scheduler::{Job, Scheduler};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use walkdir::WalkDir;

use crate::extract::is_supported;
use crate::{AppError, Result};

/// Progress logging interval
const PROGRESS_INTERVAL: usize = 10_000;

/// Cancellation check interval
const CANCEL_CHECK_INTERVAL: usize = 1_000;

/// Walk errors logged in detail before going quiet
const LOGGED_ERRORS: usize = 10;

/// Names never indexed: resource forks and OS thumbnail/metadata files.
pub fn is_ignored_name(name: &str) -> bool {
    name.starts_with("._") || name.starts_with(".DS_Store") || name.starts_with("Thumbs.db")
}

/// Files found under a directory, grouped by size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedFiles {
    pub light: Vec<PathBuf>,
    pub medium: Vec<PathBuf>,
    pub heavy: Vec<PathBuf>,
}

impl CollectedFiles {
    pub fn total(&self) -> usize {
        self.light.len() + self.medium.len() + self.heavy.len()
    }

    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            light: self.light.len(),
            medium: self.medium.len(),
            heavy: self.heavy.len(),
        }
    }

    pub fn category(&self, category: SizeCategory) -> &[PathBuf] {
        match category {
            SizeCategory::Light => &self.light,
            SizeCategory::Medium => &self.medium,
            SizeCategory::Heavy => &self.heavy,
        }
    }

    fn push(&mut self, path: PathBuf, size: u64) {
        match SizeCategory::from_size(size) {
            SizeCategory::Light => self.light.push(path),
            SizeCategory::Medium => self.medium.push(path),
            SizeCategory::Heavy => self.heavy.push(path),
        }
    }
}

/// Outcome of indexing a directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub success_count: usize,
    pub total_files: usize,
    pub elapsed_secs: f64,
    pub files_per_second: f64,
    /// Indexing stopped early through cancellation
    pub cancelled: bool,
}

/// Recursively collect supported files under `dir`.
///
/// Unreadable entries are counted and skipped. Returns
/// [`AppError::Cancelled`] when `cancel` is raised during the walk.
pub fn collect_files(dir: &Path, cancel: &AtomicBool) -> Result<CollectedFiles> {
    if !dir.is_dir() {
        return Err(AppError::Indexing(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    tracing::info!("Collecting files under {}", dir.display());

    let mut files = CollectedFiles::default();
    let mut errors = 0;
    let mut count = 0;

    for entry_result in WalkDir::new(dir).follow_links(false) {
        count += 1;

        if count % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::SeqCst) {
            tracing::info!("File collection cancelled after {} entries", count);
            return Err(AppError::Cancelled);
        }
        if count % PROGRESS_INTERVAL == 0 {
            tracing::info!("Collection progress: {} entries visited", count);
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                errors += 1;
                if errors <= LOGGED_ERRORS {
                    tracing::debug!("Error walking directory: {}", e);
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_ignored_name(&name) || !is_supported(entry.path()) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                errors += 1;
                if errors <= LOGGED_ERRORS {
                    tracing::debug!("Cannot get metadata for {:?}: {}", entry.path(), e);
                }
                continue;
            }
        };

        files.push(entry.into_path(), size);
    }

    tracing::info!(
        "Collected {} files (light {}, medium {}, heavy {}), {} errors",
        files.total(),
        files.light.len(),
        files.medium.len(),
        files.heavy.len(),
        errors
    );

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_ignored_name() {
        assert!(is_ignored_name("._report.pdf"));
        assert!(is_ignored_name(".DS_Store"));
        assert!(is_ignored_name("Thumbs.db"));
        assert!(is_ignored_name("Thumbs.db:encryptable"));
        assert!(is_ignored_name(".DS_Store.bak"));
        assert!(!is_ignored_name("thumbs.txt"));
        assert!(!is_ignored_name("report.pdf"));
        assert!(!is_ignored_name(".hidden.txt"));
    }

    #[test]
    fn test_collect_files() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("sub").join("deeper");
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(nested.join("b.pdf"), "b").unwrap();
        std::fs::write(dir.path().join("c.png"), "c").unwrap();
        std::fs::write(dir.path().join("._a.txt"), "x").unwrap();

        let cancel = AtomicBool::new(false);
        let files = collect_files(dir.path(), &cancel).unwrap();

        assert_eq!(files.total(), 2);
        assert_eq!(files.light.len(), 2);
        assert!(files.medium.is_empty());
        assert_eq!(files.counts().total(), 2);
        assert!(files.light.contains(&nested.join("b.pdf")));
    }

    #[test]
    fn test_collect_missing_dir() {
        let dir = TempDir::new().unwrap();
        let cancel = AtomicBool::new(false);
        let result = collect_files(&dir.path().join("absent"), &cancel);
        assert!(matches!(result, Err(AppError::Indexing(_))));
    }

    #[test]
    fn test_collect_cancelled() {
        let dir = TempDir::new().unwrap();
        for i in 0..CANCEL_CHECK_INTERVAL {
            std::fs::write(dir.path().join(format!("{}.txt", i)), "x").unwrap();
        }
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            collect_files(dir.path(), &cancel),
            Err(AppError::Cancelled)
        ));
    }
}
