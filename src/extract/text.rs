//! Plain text files and ZIP archives of text files.

use std::io::Read;
use std::path::Path;

use zip::ZipArchive;

use crate::{AppError, Result};

const ZIP_MAX_MEMBERS: usize = 50;
const ZIP_MAX_MEMBER_BYTES: u64 = 1024 * 1024;
const ZIP_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "log", "csv", "json", "xml", "html", "htm", "py", "js", "css",
];

/// Decode bytes as UTF-8, then Shift_JIS (CP932), then lossy UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if let Some(text) =
        encoding_rs::SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes)
    {
        return text.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

pub(super) fn extract_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text(&bytes))
}

fn is_text_member(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| ZIP_TEXT_EXTENSIONS.contains(&ext.as_str()))
}

/// Text members of an archive, each as `[name]\n<text>`, blank-line separated.
pub(super) fn extract_zip(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        AppError::Extraction(format!("Invalid ZIP archive {}: {}", path.display(), e))
    })?;

    let mut sections: Vec<String> = Vec::new();

    for i in 0..archive.len() {
        if sections.len() >= ZIP_MAX_MEMBERS {
            tracing::debug!("{}: member limit of {} reached", path.display(), ZIP_MAX_MEMBERS);
            break;
        }

        let mut member = match archive.by_index(i) {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!("{}: skipping member {}: {}", path.display(), i, e);
                continue;
            }
        };

        if member.is_dir() || !is_text_member(member.name()) {
            continue;
        }
        let name = member.name().to_string();

        if member.size() > ZIP_MAX_MEMBER_BYTES {
            tracing::debug!("{}: skipping large member {} ({} bytes)", path.display(), name, member.size());
            continue;
        }

        let mut raw = Vec::with_capacity(member.size() as usize);
        if let Err(e) = member.read_to_end(&mut raw) {
            tracing::debug!("{}: failed to read {}: {}", path.display(), name, e);
            continue;
        }

        let text = decode_text(&raw);
        let text = text.trim();
        if !text.is_empty() {
            sections.push(format!("[{}]\n{}", name, text));
        }
    }

    Ok(sections.join("\n\n"))
}
