//! Installation self-check behind `livefind doctor`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cache::persist::HOT_CACHE_FILE;
use crate::config::{AppConfig, DataLayout, LOG_FILE};
use crate::extract::OcrExtractor;
use crate::system::{optimal_shard_count, optimal_thread_count, HardwareProfile};

const LOG_TAIL_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticReport {
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    /// False when any check failed. Warnings do not count.
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "[{}] {:<14} {}", check.status, check.name, check.detail)?;
        }
        write!(
            f,
            "{} passed, {} warnings, {} failed",
            self.count(CheckStatus::Pass),
            self.count(CheckStatus::Warn),
            self.count(CheckStatus::Fail)
        )
    }
}

/// Run every check against the configured data directory.
pub fn run(config: &AppConfig) -> DiagnosticReport {
    run_with_hardware(config, &HardwareProfile::detect())
}

pub fn run_with_hardware(config: &AppConfig, hardware: &HardwareProfile) -> DiagnosticReport {
    let layout = config.layout();
    let ocr = OcrExtractor::new(&config.ocr);

    DiagnosticReport {
        checks: vec![
            check_data_dir(&layout),
            check_settings(&layout),
            check_shards(&layout),
            check_hot_cache(&layout),
            check_log(&layout),
            check_ocr(&ocr),
            check_hardware(hardware),
        ],
    }
}

fn check_data_dir(layout: &DataLayout) -> Check {
    const NAME: &str = "data directory";
    let root = layout.root();

    if let Err(e) = std::fs::create_dir_all(root) {
        return Check::new(NAME, CheckStatus::Fail, format!("{}: {}", root.display(), e));
    }

    let probe = root.join(".livefind-write-test");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(&probe) {
                tracing::debug!("Could not remove {}: {}", probe.display(), e);
            }
            Check::new(NAME, CheckStatus::Pass, format!("{} is writable", root.display()))
        }
        Err(e) => Check::new(
            NAME,
            CheckStatus::Fail,
            format!("{} is not writable: {}", root.display(), e),
        ),
    }
}

fn check_settings(layout: &DataLayout) -> Check {
    const NAME: &str = "settings";
    let path = layout.settings_file();

    if !path.exists() {
        return Check::new(
            NAME,
            CheckStatus::Warn,
            format!("{} not found, using defaults", path.display()),
        );
    }

    match AppConfig::load(layout.root()) {
        Ok(_) => Check::new(NAME, CheckStatus::Pass, format!("{} parsed", path.display())),
        Err(e) => Check::new(NAME, CheckStatus::Fail, e.to_string()),
    }
}

fn shard_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.starts_with("complete_search_db_") && n.ends_with(".db"))
        })
        .collect()
}

fn check_shards(layout: &DataLayout) -> Check {
    const NAME: &str = "shards";
    let files = shard_files(&layout.storage_dir());
    if files.is_empty() {
        return Check::new(NAME, CheckStatus::Warn, "no shard databases yet, run `livefind index`");
    }

    let bytes: u64 = files
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    Check::new(
        NAME,
        CheckStatus::Pass,
        format!("{} shard file(s), {:.1} MB", files.len(), bytes as f64 / (1024.0 * 1024.0)),
    )
}

fn check_hot_cache(layout: &DataLayout) -> Check {
    const NAME: &str = "hot cache";
    let path = layout.cache_dir().join(HOT_CACHE_FILE);
    match std::fs::metadata(&path) {
        Ok(meta) => Check::new(
            NAME,
            CheckStatus::Pass,
            format!("{} ({} bytes)", path.display(), meta.len()),
        ),
        Err(_) => Check::new(NAME, CheckStatus::Warn, format!("{} not found", path.display())),
    }
}

/// Newest file in `dir` whose name starts with the log file prefix.
fn latest_log(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE))
        .filter_map(|e| Some((e.metadata().ok()?.modified().ok()?, e.path())))
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

fn tail(text: &str, lines: usize) -> Vec<&str> {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].to_vec()
}

fn check_log(layout: &DataLayout) -> Check {
    const NAME: &str = "log";
    let Some(path) = latest_log(&layout.logs_dir()) else {
        return Check::new(
            NAME,
            CheckStatus::Warn,
            format!("no log files in {}", layout.logs_dir().display()),
        );
    };

    match std::fs::read(&path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let mut detail = path.display().to_string();
            for line in tail(&text, LOG_TAIL_LINES) {
                detail.push_str("\n    ");
                detail.push_str(line);
            }
            Check::new(NAME, CheckStatus::Pass, detail)
        }
        Err(e) => Check::new(NAME, CheckStatus::Warn, format!("{}: {}", path.display(), e)),
    }
}

fn check_ocr(ocr: &OcrExtractor) -> Check {
    const NAME: &str = "ocr";
    if ocr.is_available() {
        return Check::new(NAME, CheckStatus::Pass, ocr.status());
    }

    let hint = if cfg!(windows) {
        "install from https://github.com/UB-Mannheim/tesseract/wiki or set ocr.tesseract_path"
    } else {
        "install the `tesseract-ocr` package (with eng and jpn data) or set ocr.tesseract_path"
    };
    Check::new(NAME, CheckStatus::Warn, format!("{}; {}", ocr.status(), hint))
}

fn check_hardware(hw: &HardwareProfile) -> Check {
    Check::new(
        "hardware",
        CheckStatus::Pass,
        format!(
            "{}; auto sizing {} shards, {} workers",
            hw,
            optimal_shard_count(hw),
            optimal_thread_count(hw)
        ),
    )
}
