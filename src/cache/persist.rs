//! Hot layer persistence.
//!
//! The hot layer is written as a JSON object keyed by file path. The
//! immediate layer is never persisted; a leftover `immediate_cache.json`
//! from an older layout is removed on load.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::HotEntry;
use crate::{AppError, Result};

pub const HOT_CACHE_FILE: &str = "hot_cache.json";
pub const IMMEDIATE_CACHE_FILE: &str = "immediate_cache.json";

/// Write the hot layer to `<cache_dir>/hot_cache.json`.
///
/// The file is written to a temporary name first and renamed into place.
pub fn save_hot(cache_dir: &Path, entries: &HashMap<String, HotEntry>) -> Result<usize> {
    std::fs::create_dir_all(cache_dir)?;

    let json = serde_json::to_string(entries)
        .map_err(|e| AppError::Cache(format!("Failed to serialize hot cache: {}", e)))?;

    let target = cache_dir.join(HOT_CACHE_FILE);
    let staging = cache_dir.join(format!("{}.tmp", HOT_CACHE_FILE));
    std::fs::write(&staging, json)?;
    std::fs::rename(&staging, &target)?;

    Ok(entries.len())
}

/// Load the hot layer, dropping entries older than `ttl` at `now`.
///
/// A missing file yields an empty map. Returns the kept entries and the
/// number of expired ones.
pub fn load_hot(
    cache_dir: &Path,
    ttl: Duration,
    now: f64,
) -> Result<(HashMap<String, HotEntry>, usize)> {
    let stale = cache_dir.join(IMMEDIATE_CACHE_FILE);
    if stale.exists() {
        std::fs::remove_file(&stale)?;
        tracing::debug!("Removed stale {:?}", stale);
    }

    let path = cache_dir.join(HOT_CACHE_FILE);
    if !path.exists() {
        return Ok((HashMap::new(), 0));
    }

    let text = std::fs::read_to_string(&path)?;
    let loaded: HashMap<String, HotEntry> = serde_json::from_str(&text)
        .map_err(|e| AppError::Cache(format!("Failed to parse {}: {}", path.display(), e)))?;

    let ttl_secs = ttl.as_secs_f64();
    let total = loaded.len();
    let kept: HashMap<String, HotEntry> = loaded
        .into_iter()
        .filter(|(_, entry)| now - entry.cached_at() < ttl_secs)
        .collect();

    let expired = total - kept.len();
    Ok((kept, expired))
}

/// Delete both cache files if present.
pub fn remove_files(cache_dir: &Path) -> Result<()> {
    for name in [HOT_CACHE_FILE, IMMEDIATE_CACHE_FILE] {
        let path = cache_dir.join(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str, indexed_at: f64, promoted_at: Option<f64>) -> HotEntry {
        HotEntry {
            file_path: path.to_string(),
            file_name: "n.txt".to_string(),
            content: "body".to_string(),
            file_type: ".txt".to_string(),
            size: 4,
            indexed_at,
            promoted_at,
        }
    }

    const DAY: f64 = 86_400.0;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let (entries, expired) = load_hot(dir.path(), Duration::from_secs(60), 0.0).unwrap();
        assert!(entries.is_empty());
        assert_eq!(expired, 0);
    }

    #[test]
    fn test_save_then_load_drops_expired() {
        let dir = TempDir::new().unwrap();
        let now = 100.0 * DAY;

        let mut map = HashMap::new();
        map.insert("/fresh".to_string(), entry("/fresh", now - 8.0 * DAY, Some(now - DAY)));
        map.insert("/old".to_string(), entry("/old", now - 9.0 * DAY, None));
        assert_eq!(save_hot(dir.path(), &map).unwrap(), 2);

        let (kept, expired) =
            load_hot(dir.path(), Duration::from_secs(7 * 86_400), now).unwrap();
        assert_eq!(expired, 1);
        assert!(kept.contains_key("/fresh"));
        assert!(!kept.contains_key("/old"));
    }

    #[test]
    fn test_load_removes_stale_immediate_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(IMMEDIATE_CACHE_FILE), "{}").unwrap();
        load_hot(dir.path(), Duration::from_secs(60), 0.0).unwrap();
        assert!(!dir.path().join(IMMEDIATE_CACHE_FILE).exists());
    }

    #[test]
    fn test_corrupt_file_is_cache_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(HOT_CACHE_FILE), "{not json").unwrap();
        assert!(matches!(
            load_hot(dir.path(), Duration::from_secs(60), 0.0),
            Err(AppError::Cache(_))
        ));
    }

    #[test]
    fn test_remove_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(HOT_CACHE_FILE), "{}").unwrap();
        remove_files(dir.path()).unwrap();
        assert!(!dir.path().join(HOT_CACHE_FILE).exists());
        // Second call with nothing to remove is fine
        remove_files(dir.path()).unwrap();
    }
}
