//! File actions for the search UI.
//!
//! Provides operations that can be performed on search results:
//! open with the default application, reveal in the file manager and
//! copy the path to the clipboard.

use std::io;
use std::path::Path;

use crate::{AppError, Result};

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(AppError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} no longer exists", path.display()),
        )))
    }
}

/// Open a file with its registered application.
///
/// # Errors
/// Returns error if the file doesn't exist or can't be opened.
pub fn open_file(path: &Path) -> Result<()> {
    ensure_exists(path)?;
    tracing::info!("Opening file: {:?}", path);

    opener::open(path)
        .map_err(|e| AppError::Io(io::Error::other(format!("Failed to open file: {}", e))))
}

/// Show the file selected in Explorer / Finder, or its folder elsewhere.
pub fn reveal_in_explorer(path: &Path) -> Result<()> {
    ensure_exists(path)?;
    tracing::info!("Revealing file in explorer: {:?}", path);

    opener::reveal(path)
        .map_err(|e| AppError::Io(io::Error::other(format!("Failed to reveal file: {}", e))))
}

/// Copy the full file path to the system clipboard.
pub fn copy_to_clipboard(path: &Path) -> Result<()> {
    tracing::info!("Copying path to clipboard: {:?}", path);

    let mut clipboard = arboard::Clipboard::new().map_err(|e| {
        AppError::Io(io::Error::other(format!("Failed to access clipboard: {}", e)))
    })?;

    clipboard
        .set_text(path.to_string_lossy().into_owned())
        .map_err(|e| AppError::Io(io::Error::other(format!("Failed to set clipboard text: {}", e))))
}
