//! OCR for TIFF images through an external tesseract executable.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;

use crate::config::OcrConfig;
use crate::text::safe_truncate;
use crate::{AppError, Result};

const MIN_IMAGE_BYTES: u64 = 1024;
const MAX_IMAGE_BYTES: u64 = 30 * 1024 * 1024;
/// Japanese retry is only attempted below this size.
const JAPANESE_RETRY_BYTES: u64 = 5 * 1024 * 1024;
const MIN_PIXELS: u64 = 10_000;
const MAX_OCR_CHARS: usize = 5_000;

const MEMO_CAPACITY: usize = 1_000;
const MEMO_EVICT: usize = 100;

const WINDOWS_INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

fn command(program: &Path) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// A tesseract executable that answered `--version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrEngine {
    pub program: PathBuf,
    pub version: String,
}

impl OcrEngine {
    /// Find a working tesseract: the configured path first, then `PATH`,
    /// then the standard Windows install locations.
    pub fn probe(configured: Option<&Path>) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = configured {
            candidates.push(path.to_path_buf());
        }
        candidates.push(PathBuf::from("tesseract"));
        candidates.extend(WINDOWS_INSTALL_PATHS.iter().map(PathBuf::from));

        for program in candidates {
            match Self::version_of(&program) {
                Some(version) => {
                    tracing::info!("Found tesseract {} at {}", version, program.display());
                    return Ok(Self { program, version });
                }
                None => tracing::debug!("No tesseract at {}", program.display()),
            }
        }

        Err(AppError::Extraction("Tesseract executable not found".to_string()))
    }

    fn version_of(program: &Path) -> Option<String> {
        let output = command(program).arg("--version").output().ok()?;
        // Older releases print the banner on stderr
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        parse_version(&banner)
    }

    /// Recognise text in `image` with one language pack.
    pub fn recognize(&self, image: &Path, lang: &str) -> Result<String> {
        let output: Output = command(&self.program)
            .arg(image)
            .arg("stdout")
            .args(["--oem", "1", "--psm", "6", "-l", lang])
            .output()
            .map_err(|e| AppError::Extraction(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Extraction(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Version from a banner such as `tesseract 5.3.0`.
fn parse_version(banner: &str) -> Option<String> {
    let first = banner.lines().find(|l| !l.trim().is_empty())?;
    let mut words = first.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("tesseract") {
        return None;
    }
    let version = words.next()?.trim_start_matches('v');
    version
        .starts_with(|c: char| c.is_ascii_digit())
        .then(|| version.to_string())
}

/// Reject output that is too short or made of too few distinct characters.
fn clean_output(raw: &str) -> String {
    let raw = raw.trim();
    if raw.chars().count() < 2 {
        return String::new();
    }

    let mut distinct: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 3 {
        return String::new();
    }

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    safe_truncate(&collapsed, MAX_OCR_CHARS).to_string()
}

type MemoKey = (PathBuf, SystemTime);

#[derive(Default)]
struct Memo {
    entries: HashMap<MemoKey, String>,
    order: VecDeque<MemoKey>,
}

impl Memo {
    fn get(&self, key: &MemoKey) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: MemoKey, text: String) {
        if self.entries.insert(key.clone(), text).is_none() {
            self.order.push_back(key);
        }
        if self.entries.len() > MEMO_CAPACITY {
            for _ in 0..MEMO_EVICT {
                if let Some(old) = self.order.pop_front() {
                    self.entries.remove(&old);
                }
            }
        }
    }
}

/// Image text extraction with a result memo keyed by path and mtime.
pub struct OcrExtractor {
    enabled: bool,
    configured: Option<PathBuf>,
    engine: OnceLock<Option<OcrEngine>>,
    memo: Mutex<Memo>,
}

impl OcrExtractor {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            enabled: config.enabled,
            configured: config.tesseract_path.clone(),
            engine: OnceLock::new(),
            memo: Mutex::new(Memo::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The tesseract engine, probed on first use.
    pub fn engine(&self) -> Option<&OcrEngine> {
        self.engine
            .get_or_init(|| match OcrEngine::probe(self.configured.as_deref()) {
                Ok(engine) => Some(engine),
                Err(e) => {
                    tracing::warn!("OCR unavailable: {}", e);
                    None
                }
            })
            .as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.engine().is_some()
    }

    /// Human-readable availability line.
    pub fn status(&self) -> String {
        if !self.enabled {
            return "OCR disabled in settings".to_string();
        }
        match self.engine() {
            Some(engine) => format!("Tesseract v{} ({})", engine.version, engine.program.display()),
            None => "Tesseract executable not found".to_string(),
        }
    }

    /// OCR text of an image, or empty when OCR is off, the image is out of
    /// bounds or recognition fails.
    pub fn extract(&self, path: &Path) -> Result<String> {
        if !self.enabled {
            return Ok(String::new());
        }

        let meta = std::fs::metadata(path)?;
        let key: MemoKey = (path.to_path_buf(), meta.modified()?);
        if let Some(text) = self.memo.lock().ok().and_then(|memo| memo.get(&key)) {
            tracing::debug!("OCR memo hit: {}", path.display());
            return Ok(text);
        }

        let text = self.recognize(path, meta.len());
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(key, text.clone());
        }
        Ok(text)
    }

    fn recognize(&self, path: &Path, size: u64) -> String {
        if !(MIN_IMAGE_BYTES..=MAX_IMAGE_BYTES).contains(&size) {
            tracing::debug!("{}: size {} outside OCR limits", path.display(), size);
            return String::new();
        }

        match image::image_dimensions(path) {
            Ok((w, h)) if u64::from(w) * u64::from(h) >= MIN_PIXELS => {}
            Ok((w, h)) => {
                tracing::debug!("{}: {}x{} too small for OCR", path.display(), w, h);
                return String::new();
            }
            Err(e) => {
                tracing::warn!("{}: unreadable image: {}", path.display(), e);
                return String::new();
            }
        }

        let Some(engine) = self.engine() else {
            return String::new();
        };

        let mut text = engine.recognize(path, "eng").unwrap_or_else(|e| {
            tracing::warn!("{}: {}", path.display(), e);
            String::new()
        });

        if text.chars().count() < 3 && size < JAPANESE_RETRY_BYTES {
            match engine.recognize(path, "jpn") {
                Ok(jp) if jp.chars().count() > text.chars().count() => text = jp,
                Ok(_) => {}
                Err(e) => tracing::debug!("{}: Japanese OCR failed: {}", path.display(), e),
            }
        }

        let text = clean_output(&text);
        if text.chars().count() > 10 {
            tracing::info!("OCR read {} characters from {}", text.chars().count(), path.display());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("tesseract 5.3.0\n leptonica-1.82"), Some("5.3.0".to_string()));
        assert_eq!(parse_version("tesseract v5.0.0-alpha"), Some("5.0.0-alpha".to_string()));
        assert_eq!(parse_version("\ntesseract 4.1.1"), Some("4.1.1".to_string()));
        assert_eq!(parse_version("something else 1.0"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(clean_output("a"), "");
        assert_eq!(clean_output("aa aa"), "");
        assert_eq!(clean_output("  Invoice\n\n No.  12 "), "Invoice No. 12");
        assert_eq!(clean_output(&"abc ".repeat(2_000)).chars().count(), MAX_OCR_CHARS);
    }

    #[test]
    fn test_memo_eviction() {
        let mut memo = Memo::default();
        for i in 0..=MEMO_CAPACITY {
            memo.insert((PathBuf::from(format!("/{}", i)), SystemTime::UNIX_EPOCH), String::new());
        }
        assert_eq!(memo.entries.len(), MEMO_CAPACITY + 1 - MEMO_EVICT);
        assert!(memo.get(&(PathBuf::from("/0"), SystemTime::UNIX_EPOCH)).is_none());
        assert!(memo.get(&(PathBuf::from(format!("/{}", MEMO_CAPACITY)), SystemTime::UNIX_EPOCH)).is_some());
    }

    #[test]
    fn test_disabled_extractor_returns_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.tif");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let ocr = OcrExtractor::new(&OcrConfig {
            enabled: false,
            tesseract_path: None,
        });
        assert_eq!(ocr.extract(&path).unwrap(), "");
        assert!(!ocr.is_available());
        assert_eq!(ocr.status(), "OCR disabled in settings");
    }

    #[test]
    fn test_small_image_skipped_without_probe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.tif");
        std::fs::write(&path, [0u8; 100]).unwrap();

        let ocr = OcrExtractor::new(&OcrConfig::default());
        assert_eq!(ocr.extract(&path).unwrap(), "");
        // Size check happens before the engine is probed
        assert!(ocr.engine.get().is_none());
    }

    #[test]
    fn test_probe_bad_configured_path_falls_through() {
        let result = OcrEngine::probe(Some(Path::new("/nonexistent/tesseract-binary")));
        if let Ok(engine) = result {
            assert_ne!(engine.program, PathBuf::from("/nonexistent/tesseract-binary"));
        }
    }
}
