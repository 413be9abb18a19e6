//! Office documents: OOXML via zip + xml-rs, spreadsheets via calamine,
//! and a printable-text scan for legacy binary formats.

use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Datelike, NaiveDate};
use xml::reader::{EventReader, XmlEvent};
use zip::ZipArchive;

use crate::{AppError, Result};

/// OOXML files below this size cannot hold a document part.
const MIN_OOXML_BYTES: u64 = 100;

const LEGACY_MAX_BYTES: u64 = 100 * 1024 * 1024;
const LEGACY_SCAN_BYTES: u64 = 1024 * 1024;
const LEGACY_MIN_RUN: usize = 3;
const LEGACY_MAX_RUNS: usize = 50;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn open_archive(path: &Path) -> Result<ZipArchive<std::fs::File>> {
    let file = std::fs::File::open(path)?;
    ZipArchive::new(file).map_err(|e| {
        AppError::Extraction(format!("Not an OOXML package {}: {}", path.display(), e))
    })
}

fn read_member(archive: &mut ZipArchive<std::fs::File>, name: &str) -> Result<String> {
    let mut member = archive
        .by_name(name)
        .map_err(|e| AppError::Extraction(format!("Missing {}: {}", name, e)))?;
    let mut xml = String::new();
    member
        .read_to_string(&mut xml)
        .map_err(|e| AppError::Extraction(format!("Failed to read {}: {}", name, e)))?;
    Ok(xml)
}

/// Trimmed, non-empty text nodes of an XML document.
fn xml_text_nodes(xml: &str) -> Vec<String> {
    let mut nodes = Vec::new();
    for event in EventReader::from_str(xml) {
        match event {
            Ok(XmlEvent::Characters(text)) | Ok(XmlEvent::CData(text)) => {
                let text = text.trim();
                if !text.is_empty() {
                    nodes.push(text.to_string());
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("XML parse stopped early: {}", e);
                break;
            }
        }
    }
    nodes
}

pub(super) fn extract_docx(path: &Path) -> Result<String> {
    if std::fs::metadata(path)?.len() < MIN_OOXML_BYTES {
        return Ok(String::new());
    }

    let mut archive = open_archive(path)?;
    if archive.index_for_name("word/document.xml").is_none() {
        tracing::debug!("{} has no word/document.xml", path.display());
        return Ok(String::new());
    }

    let xml = read_member(&mut archive, "word/document.xml")?;
    Ok(xml_text_nodes(&xml).join(" "))
}

/// Slide number from `ppt/slides/slideN.xml`.
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

pub(super) fn extract_pptx(path: &Path) -> Result<String> {
    let mut archive = open_archive(path)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort();

    let mut lines = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_member(&mut archive, &name)?;
        let line = xml_text_nodes(&xml).join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    Ok(lines.join("\n"))
}

/// Format an Excel serial date as `Y/M/D`.
fn serial_date(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(chrono::Duration::days(serial.floor() as i64))?;
    Some(format!("{}/{}/{}", date.year(), date.month(), date.day()))
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => serial_date(dt.as_f64())?,
    };
    (!text.is_empty()).then_some(text)
}

/// Every sheet, one line per non-empty row.
///
/// Legacy workbooks also get a `[Sheet: name]` line before each sheet.
pub(super) fn extract_sheets(path: &Path, sheet_headers: bool) -> Result<String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        AppError::Extraction(format!("Failed to open workbook {}: {}", path.display(), e))
    })?;

    let mut lines: Vec<String> = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::debug!("{}: skipping sheet {}: {}", path.display(), name, e);
                continue;
            }
        };

        if sheet_headers {
            lines.push(format!("[Sheet: {}]", name));
        }

        for row in range.rows() {
            let values: Vec<String> = row.iter().filter_map(cell_text).collect();
            if !values.is_empty() {
                lines.push(values.join(" "));
            }
        }
    }

    Ok(lines.join("\n"))
}

fn is_run_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b" .,!?-_()[]{}\":;".contains(&byte)
}

/// Runs of printable ASCII of at least three bytes.
fn printable_runs(data: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for &byte in data {
        if is_run_char(byte) {
            current.push(byte);
            continue;
        }
        if current.len() >= LEGACY_MIN_RUN {
            runs.push(String::from_utf8_lossy(&current).into_owned());
        }
        current.clear();
    }
    if current.len() >= LEGACY_MIN_RUN {
        runs.push(String::from_utf8_lossy(&current).into_owned());
    }

    runs
}

/// Binary Office formats (.doc, .ppt): scan the first megabyte for
/// readable text and tag it with the file name.
pub(super) fn extract_legacy(path: &Path, label: &str) -> Result<String> {
    let size = std::fs::metadata(path)?.len();
    if size == 0 || size > LEGACY_MAX_BYTES {
        tracing::debug!("{}: size {} outside legacy limits", path.display(), size);
        return Ok(String::new());
    }

    let mut data = Vec::new();
    std::fs::File::open(path)?
        .take(LEGACY_SCAN_BYTES)
        .read_to_end(&mut data)?;

    let runs = printable_runs(&data);
    let name = file_name(path);
    let text = runs
        .into_iter()
        .take(LEGACY_MAX_RUNS)
        .collect::<Vec<_>>()
        .join(" ");

    if text.trim().is_empty() {
        Ok(format!("{} - {}", label, name))
    } else {
        Ok(format!("{} - {}", text, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t> report </w:t></w:r></w:p>
    <w:p><w:r><w:t>見積書</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn slide_xml(body: &str) -> String {
        format!(
            concat!(
                r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
                r#"xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
                "{}</p:sld>"
            ),
            body
        )
    }

    #[test]
    fn test_xml_text_nodes_stops_at_first_error() {
        let nodes = xml_text_nodes("<a><b> kept </b></c>lost</a>");
        assert_eq!(nodes, vec!["kept"]);

        // Unbound prefixes are rejected before any text
        assert!(xml_text_nodes("<p:sld><a:t>text</a:t></p:sld>").is_empty());
    }

    #[test]
    fn test_extract_docx_keeps_text_before_malformed_xml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("damaged.docx");
        let xml = concat!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body><w:p><w:t>Recovered heading</w:t></w:p></w:wrong>",
            "<w:p><w:t>Unreachable</w:t></w:p></w:body></w:document>"
        );
        write_zip(&path, &[("word/document.xml", xml)]);

        assert_eq!(extract_docx(&path).unwrap(), "Recovered heading");
    }

    #[test]
    fn test_extract_docx() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.docx");
        write_zip(&path, &[("word/document.xml", DOCUMENT_XML)]);

        assert_eq!(extract_docx(&path).unwrap(), "Quarterly report 見積書");
    }

    #[test]
    fn test_docx_without_document_part() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.docx");
        write_zip(&path, &[("other.xml", &"<a>padding</a>".repeat(20))]);
        assert_eq!(extract_docx(&path).unwrap(), "");
    }

    #[test]
    fn test_tiny_docx_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.docx");
        std::fs::write(&path, b"PK").unwrap();
        assert_eq!(extract_docx(&path).unwrap(), "");
    }

    #[test]
    fn test_corrupt_docx_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.docx");
        std::fs::write(&path, vec![b'x'; 500]).unwrap();
        assert!(matches!(extract_docx(&path), Err(AppError::Extraction(_))));
    }

    #[test]
    fn test_extract_pptx_orders_slides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        let tenth = slide_xml("<a:t>tenth</a:t>");
        let second = slide_xml("<a:t>second</a:t><a:t>slide</a:t>");
        write_zip(
            &path,
            &[
                ("ppt/slides/slide10.xml", tenth.as_str()),
                ("ppt/slides/slide2.xml", second.as_str()),
                ("ppt/slides/_rels/slide2.xml.rels", "<r>ignored</r>"),
            ],
        );

        assert_eq!(extract_pptx(&path).unwrap(), "second slide\ntenth");
    }

    #[test]
    fn test_slide_number() {
        assert_eq!(slide_number("ppt/slides/slide3.xml"), Some(3));
        assert_eq!(slide_number("ppt/slides/_rels/slide3.xml.rels"), None);
        assert_eq!(slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(42.0)), Some("42".to_string()));
        assert_eq!(cell_text(&Data::Float(1.5)), Some("1.5".to_string()));
        assert_eq!(cell_text(&Data::String("  hi ".into())), Some("hi".to_string()));
        assert_eq!(cell_text(&Data::String("   ".into())), None);
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::Bool(true)), Some("true".to_string()));
    }

    #[test]
    fn test_serial_date() {
        assert_eq!(serial_date(45292.0), Some("2024/1/1".to_string()));
    }

    #[test]
    fn test_printable_runs() {
        let data = b"\x00\x01Hello World\x00ab\x00xyz!\xff";
        assert_eq!(printable_runs(data), vec!["Hello World", "xyz!"]);
    }

    #[test]
    fn test_extract_legacy_doc() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.doc");
        let mut data = vec![0u8; 64];
        data.extend_from_slice(b"Contract terms");
        data.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, data).unwrap();

        assert_eq!(
            extract_legacy(&path, "Microsoft Word document").unwrap(),
            "Contract terms - old.doc"
        );
    }

    #[test]
    fn test_extract_legacy_without_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.doc");
        std::fs::write(&path, [0u8; 32]).unwrap();
        assert_eq!(
            extract_legacy(&path, "Microsoft Word document").unwrap(),
            "Microsoft Word document - blank.doc"
        );
    }

    #[test]
    fn test_empty_legacy_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zero.ppt");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(extract_legacy(&path, "x").unwrap(), "");
    }

    #[test]
    fn test_garbage_workbook_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();
        assert!(matches!(extract_sheets(&path, false), Err(AppError::Extraction(_))));
    }
}
