//! PDF text via pdf-extract, with a raw string-literal scan when the
//! document does not parse.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::text::safe_truncate;
use crate::Result;

const MIN_PDF_BYTES: u64 = 50;
const MAX_PDF_BYTES: u64 = 50 * 1024 * 1024;
const MAX_PDF_CHARS: usize = 500_000;
const FALLBACK_SCAN_BYTES: usize = 1024 * 1024;

pub(super) fn extract_pdf(path: &Path) -> Result<String> {
    let size = std::fs::metadata(path)?.len();
    if !(MIN_PDF_BYTES..=MAX_PDF_BYTES).contains(&size) {
        tracing::debug!("{}: size {} outside PDF limits", path.display(), size);
        return Ok(String::new());
    }

    let data = std::fs::read(path)?;

    // pdf-extract panics on some malformed inputs
    let parsed = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&data)));
    let text = match parsed {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        Ok(Ok(_)) => literal_strings(&data),
        Ok(Err(e)) => {
            tracing::debug!("{}: PDF parse failed, scanning literals: {}", path.display(), e);
            literal_strings(&data)
        }
        Err(_) => {
            tracing::warn!("{}: PDF parser panicked, scanning literals", path.display());
            literal_strings(&data)
        }
    };

    Ok(safe_truncate(text.trim(), MAX_PDF_CHARS).to_string())
}

/// Parenthesised string literals in the first megabyte of a PDF.
fn literal_strings(data: &[u8]) -> String {
    let data = &data[..data.len().min(FALLBACK_SCAN_BYTES)];
    let mut found: Vec<String> = Vec::new();

    let mut rest = data;
    while let Some(open) = rest.iter().position(|&b| b == b'(') {
        let after = &rest[open + 1..];
        let Some(close) = after.iter().position(|&b| b == b')') else {
            break;
        };

        let literal = String::from_utf8_lossy(&after[..close]);
        let literal = literal.trim();
        if literal.chars().count() > 2 {
            found.push(literal.to_string());
        }
        rest = &after[close + 1..];
    }

    found.join(" ")
}
