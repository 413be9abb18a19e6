//! Search module - result types, ranking, and the query language.
//!
//! Every layer produces [`SearchHit`]s. The helpers here merge hits from
//! several sources: [`dedup_by_score`] within a layer and
//! [`rank_by_layer`] across layers.

pub mod filters;
pub mod parser;

pub use filters::*;
pub use parser::{parse_query, ParsedQuery};

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Where a search hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Volatile preview map of recently indexed files
    Immediate,
    /// Persisted in-memory content cache
    Hot,
    /// SQLite shard
    Complete { shard: usize },
}

impl Layer {
    /// Ordering weight used when merging layers (higher first).
    pub fn priority(&self) -> u32 {
        match self {
            Layer::Complete { .. } => 1000,
            Layer::Immediate => 100,
            Layer::Hot => 10,
        }
    }

    /// Short layer name without shard number.
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Immediate => "immediate",
            Layer::Hot => "hot",
            Layer::Complete { .. } => "complete",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Complete { shard } => write!(f, "complete_db_{}", shard),
            other => f.write_str(other.name()),
        }
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Absolute path of the file
    pub file_path: String,
    /// File name only
    pub file_name: String,
    /// Up to 200 characters of content
    pub preview: String,
    /// Layer that produced this hit
    pub layer: Layer,
    /// File extension including the dot (e.g. ".pdf")
    pub file_type: String,
    /// File size in bytes
    pub size: u64,
    /// Relevance within the layer (higher is better)
    pub score: f64,
}

/// Keep the best-scoring hit for each path, best first.
pub fn dedup_by_score(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut best: HashMap<String, SearchHit> = HashMap::with_capacity(hits.len());
    for hit in hits {
        match best.get(&hit.file_path) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.file_path.clone(), hit);
            }
        }
    }

    let mut merged: Vec<SearchHit> = best.into_values().collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged
}

/// Order hits by layer priority then score, dropping repeated paths.
pub fn rank_by_layer(mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.layer
            .priority()
            .cmp(&a.layer.priority())
            .then(b.score.total_cmp(&a.score))
    });

    let mut seen = HashSet::with_capacity(hits.len());
    hits.retain(|hit| seen.insert(hit.file_path.clone()));
    hits
}

/// Check a hit against a file type selector such as `pdf`, `.docx` or `all`.
pub fn matches_extension(hit: &SearchHit, selector: &str) -> bool {
    let selector = selector.trim().to_lowercase();
    if selector.is_empty() || selector == "all" {
        return true;
    }

    let suffix = if selector.starts_with('.') {
        selector
    } else {
        format!(".{}", selector)
    };
    hit.file_path.to_lowercase().ends_with(&suffix)
}

#[cfg(test)]
pub(crate) fn hit(path: &str, layer: Layer, score: f64) -> SearchHit {
    SearchHit {
        file_path: path.to_string(),
        file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
        preview: String::new(),
        layer,
        file_type: String::new(),
        size: 0,
        score,
    }
}
