//! Filter types for search queries.
//!
//! Filters narrow results after the layers have been searched:
//! `ext:pdf`, `size:>10mb`, `path:reports`.

use super::SearchHit;

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Extension filter: ext:pdf
    Extension(String),
    /// Size filter: size:>10mb (value in bytes)
    Size(SizeOp, u64),
    /// Path substring filter: path:reports
    PathScope(String),
}

/// Comparison operators for size filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOp {
    /// Greater than: size:>10mb
    GreaterThan,
    /// Greater than or equal: size:>=10mb
    GreaterEqual,
    /// Less than: size:<10mb
    LessThan,
    /// Less than or equal: size:<=10mb
    LessEqual,
}

impl SizeOp {
    pub fn compare(&self, actual: u64, bound: u64) -> bool {
        match self {
            SizeOp::GreaterThan => actual > bound,
            SizeOp::GreaterEqual => actual >= bound,
            SizeOp::LessThan => actual < bound,
            SizeOp::LessEqual => actual <= bound,
        }
    }
}

impl Filter {
    /// Check whether a hit passes this filter.
    pub fn matches(&self, hit: &SearchHit) -> bool {
        match self {
            Filter::Extension(ext) => super::matches_extension(hit, ext),
            Filter::Size(op, bytes) => op.compare(hit.size, *bytes),
            Filter::PathScope(scope) => hit
                .file_path
                .to_lowercase()
                .contains(&scope.to_lowercase()),
        }
    }
}

/// Parse a size expression like `>10mb`, `<=512k` or `2048`.
///
/// A bare number means "at least".
pub fn parse_size_filter(value: &str) -> Option<(SizeOp, u64)> {
    let value = value.trim();
    let (op, rest) = if let Some(rest) = value.strip_prefix(">=") {
        (SizeOp::GreaterEqual, rest)
    } else if let Some(rest) = value.strip_prefix("<=") {
        (SizeOp::LessEqual, rest)
    } else if let Some(rest) = value.strip_prefix('>') {
        (SizeOp::GreaterThan, rest)
    } else if let Some(rest) = value.strip_prefix('<') {
        (SizeOp::LessThan, rest)
    } else {
        (SizeOp::GreaterEqual, value)
    };

    let rest = rest.trim().to_lowercase();
    let split = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let (number, unit) = rest.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "k" | "kb" => 1024.0,
        "m" | "mb" => 1024.0 * 1024.0,
        "g" | "gb" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some((op, (number * multiplier) as u64))
}
