//! Helpers for integration tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use livefind::{AppConfig, SearchEngine};
use tempfile::TempDir;

/// A temporary data directory plus a folder of documents to index.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("docs")).expect("Failed to create docs dir");
        TestEnv { dir }
    }

    pub fn docs(&self) -> PathBuf {
        self.dir.path().join("docs")
    }

    /// Config with fixed sizing and delays long enough that only
    /// `flush_pending` or shutdown runs scheduled work.
    pub fn config(&self) -> AppConfig {
        AppConfig {
            data_dir: self.dir.path().join("data"),
            shard_count: Some(3),
            worker_threads: Some(2),
            hot_promotion_delay_ms: 60_000,
            persist_delay_ms: 60_000,
            ..AppConfig::default()
        }
    }

    pub fn open(&self) -> SearchEngine {
        SearchEngine::open(&self.config()).expect("Failed to open engine")
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.docs().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write document");
        path
    }

    pub fn write_zip(&self, name: &str, members: &[(&str, &str)]) -> PathBuf {
        let path = self.docs().join(name);
        write_zip(&path, members);
        path
    }
}

pub fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("Failed to create zip");
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in members {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .expect("Failed to start zip member");
        zip.write_all(data.as_bytes()).expect("Failed to write zip member");
    }
    zip.finish().expect("Failed to finish zip");
}
