//! LiveFind - Instant full-text search over document contents.
//!
//! This library provides the core of the LiveFind desktop search tool:
//! content extraction, the sharded SQLite full-text store, the in-memory
//! cache layers and the search engine that ties them together.

pub mod cache;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod engine;
pub mod extract;
pub mod indexer;
pub mod search;
pub mod system;
pub mod text;
pub mod ui;

pub use config::AppConfig;
pub use engine::SearchEngine;

use thiserror::Error;

/// LiveFind error types covering all failure modes.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors (SQLite operations)
    #[error("Database error: {0}")]
    Database(String),

    /// Content extraction errors (document parsing, OCR)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Configuration file errors
    #[error("Config error: {0}")]
    Config(String),

    /// Cache persistence errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Search syntax errors
    #[error("Query error: {0}")]
    Query(String),

    /// Indexing pipeline errors
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// The operation was cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
