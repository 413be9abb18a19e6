//! Application configuration and on-disk data layout.
//!
//! Settings live in `<data_dir>/config/settings.toml`. Every field has a
//! default so a missing or partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LIVEFIND_DATA_DIR";

/// File name of the settings file inside the config directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Prefix of the daily log files inside the logs directory.
pub const LOG_FILE: &str = "livefind.log";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root of all persistent state. Not stored in the settings file.
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Number of shard databases (auto-sized from hardware when unset)
    pub shard_count: Option<usize>,
    /// Indexing worker threads (auto-sized from hardware when unset)
    pub worker_threads: Option<usize>,
    /// Maximum entries in the immediate layer
    pub immediate_capacity: usize,
    /// Maximum entries in the hot layer
    pub hot_capacity: usize,
    /// Hot layer entries older than this are dropped on load
    pub hot_ttl_days: u64,
    /// Delay before a freshly indexed file moves to the hot layer
    pub hot_promotion_delay_ms: u64,
    /// Delay before a freshly indexed file is written to its shard
    pub persist_delay_ms: u64,
    /// Default result cap for searches
    pub max_results: usize,
    /// Default log filter directive
    pub log_level: String,
    /// Folder most recently indexed from the UI
    pub last_folder: Option<PathBuf>,
    /// OCR settings
    pub ocr: OcrConfig,
}

/// OCR engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    /// Run OCR on TIFF images
    pub enabled: bool,
    /// Explicit path to the tesseract executable
    pub tesseract_path: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tesseract_path: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            shard_count: None,
            worker_threads: None,
            immediate_capacity: 150_000,
            hot_capacity: 1_500_000,
            hot_ttl_days: 7,
            hot_promotion_delay_ms: 1_000,
            persist_delay_ms: 5_000,
            max_results: 5_500,
            log_level: "info".to_string(),
            last_folder: None,
            ocr: OcrConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration for the given data directory.
    ///
    /// A missing settings file yields defaults. A settings file that does
    /// not parse is an error.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let layout = DataLayout::new(data_dir);
        let path = layout.settings_file();

        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str::<AppConfig>(&text).map_err(|e| {
                AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            AppConfig::default()
        };

        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any error.
    pub fn load_or_default(data_dir: &Path) -> Self {
        match Self::load(data_dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                AppConfig {
                    data_dir: data_dir.to_path_buf(),
                    ..AppConfig::default()
                }
            }
        }
    }

    /// Write the configuration back to its settings file.
    pub fn save(&self) -> Result<()> {
        let layout = self.layout();
        std::fs::create_dir_all(layout.config_dir())?;

        let text = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(layout.settings_file(), text)?;

        tracing::debug!("Saved settings to {:?}", layout.settings_file());
        Ok(())
    }

    /// Data layout rooted at this configuration's data directory.
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }
}

/// Resolve the default data directory.
///
/// `LIVEFIND_DATA_DIR` wins; otherwise the platform data directory for
/// `livefind`, or `./livefind-data` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    directories::ProjectDirs::from("", "", "livefind")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("livefind-data"))
}

/// Paths of everything LiveFind keeps under its data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join(SETTINGS_FILE)
    }

    /// Directory holding the shard databases.
    pub fn storage_dir(&self) -> PathBuf {
        self.root.join("data_storage")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path of shard `index`.
    pub fn shard_path(&self, index: usize) -> PathBuf {
        self.storage_dir()
            .join(format!("complete_search_db_{}.db", index))
    }
}
