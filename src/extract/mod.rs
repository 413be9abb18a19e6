//! Content extraction - turn documents into searchable text.
//!
//! [`ContentExtractor::extract`] dispatches on the file extension.
//! Files that are too small, too large or of an unsupported kind yield an
//! empty string; unreadable archives and documents yield
//! [`AppError::Extraction`](crate::AppError::Extraction).

mod office;
pub mod ocr;
mod pdf;
mod text;

pub use ocr::{OcrEngine, OcrExtractor};
pub use text::decode_text;

use std::path::Path;

use crate::config::OcrConfig;
use crate::Result;

/// Extensions collected when indexing a directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "docx", "xlsx", "tif", "tiff", "doc", "xls", "ppt", "pptx", "dot", "dotx",
    "dotm", "docm", "xlt", "xltx", "xltm", "xlsm", "xlsb", "zip",
];

/// Document family, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    WordXml,
    WordLegacy,
    SheetXml,
    SheetLegacy,
    SlidesXml,
    SlidesLegacy,
    Pdf,
    Zip,
    Tiff,
    Unsupported,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "md" | "log" | "csv" | "json" | "xml" | "html" | "htm" => FileKind::Text,
            "docx" | "dotx" | "dotm" | "docm" => FileKind::WordXml,
            "doc" | "dot" => FileKind::WordLegacy,
            "xlsx" | "xltx" | "xltm" | "xlsm" | "xlsb" => FileKind::SheetXml,
            "xls" | "xlt" => FileKind::SheetLegacy,
            "pptx" => FileKind::SlidesXml,
            "ppt" => FileKind::SlidesLegacy,
            "pdf" => FileKind::Pdf,
            "zip" => FileKind::Zip,
            "tif" | "tiff" => FileKind::Tiff,
            _ => FileKind::Unsupported,
        }
    }
}

/// Whether directory indexing should pick up this path.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Dispatches extraction by file kind.
pub struct ContentExtractor {
    ocr: OcrExtractor,
}

impl ContentExtractor {
    pub fn new(ocr: &OcrConfig) -> Self {
        Self {
            ocr: OcrExtractor::new(ocr),
        }
    }

    pub fn ocr(&self) -> &OcrExtractor {
        &self.ocr
    }

    /// Extract the text of a file.
    pub fn extract(&self, path: &Path) -> Result<String> {
        match FileKind::from_path(path) {
            FileKind::Text => text::extract_text(path),
            FileKind::Zip => text::extract_zip(path),
            FileKind::WordXml => office::extract_docx(path),
            FileKind::WordLegacy => office::extract_legacy(path, "Microsoft Word document"),
            FileKind::SheetXml => office::extract_sheets(path, false),
            FileKind::SheetLegacy => office::extract_sheets(path, true),
            FileKind::SlidesXml => office::extract_pptx(path),
            FileKind::SlidesLegacy => {
                office::extract_legacy(path, "Microsoft PowerPoint presentation")
            }
            FileKind::Pdf => pdf::extract_pdf(path),
            FileKind::Tiff => self.ocr.extract(path),
            FileKind::Unsupported => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_kind_from_path() {
        assert_eq!(FileKind::from_path(Path::new("a/B.TXT")), FileKind::Text);
        assert_eq!(FileKind::from_path(Path::new("x.docm")), FileKind::WordXml);
        assert_eq!(FileKind::from_path(Path::new("x.dot")), FileKind::WordLegacy);
        assert_eq!(FileKind::from_path(Path::new("x.xlsb")), FileKind::SheetXml);
        assert_eq!(FileKind::from_path(Path::new("x.xlt")), FileKind::SheetLegacy);
        assert_eq!(FileKind::from_path(Path::new("x.pptx")), FileKind::SlidesXml);
        assert_eq!(FileKind::from_path(Path::new("x.ppt")), FileKind::SlidesLegacy);
        assert_eq!(FileKind::from_path(Path::new("x.Pdf")), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("x.zip")), FileKind::Zip);
        assert_eq!(FileKind::from_path(Path::new("x.tif")), FileKind::Tiff);
        assert_eq!(FileKind::from_path(Path::new("x.png")), FileKind::Unsupported);
        assert_eq!(FileKind::from_path(Path::new("noext")), FileKind::Unsupported);
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("/a/report.PDF")));
        assert!(is_supported(Path::new("/a/archive.zip")));
        // Extractable but not collected by directory walks
        assert!(!is_supported(Path::new("/a/notes.md")));
        assert!(!is_supported(Path::new("/a/photo.jpg")));
    }

    #[test]
    fn test_unsupported_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let extractor = ContentExtractor::new(&OcrConfig::default());
        assert_eq!(extractor.extract(&path).unwrap(), "");
    }

    #[test]
    fn test_dispatch_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# heading\nbody").unwrap();

        let extractor = ContentExtractor::new(&OcrConfig::default());
        assert_eq!(extractor.extract(&path).unwrap(), "# heading\nbody");
    }
}
