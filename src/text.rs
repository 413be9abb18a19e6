//! Query normalisation and in-memory matching.
//!
//! Japanese documents mix full-width and half-width forms as well as
//! hiragana and katakana spellings of the same word. Queries are expanded
//! into a set of patterns, and both sides are folded to a canonical form
//! (lowercase, NFKC, hiragana) before substring comparison.

use unicode_normalization::UnicodeNormalization;

/// Offset between ASCII `!`..`~` and their full-width counterparts.
const FULL_WIDTH_OFFSET: u32 = 0xFEE0;

/// Offset between hiragana and katakana code points.
const KANA_OFFSET: u32 = 0x60;

/// Truncate to at most `max_chars` characters, always on a char boundary.
pub fn safe_truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// NFKC normalisation (full-width ASCII and half-width kana to canonical forms).
pub fn nfkc(text: &str) -> String {
    text.nfkc().collect()
}

/// Shift printable ASCII to the full-width block.
pub fn to_full_width(text: &str) -> String {
    text.chars()
        .map(|c| {
            if ('!'..='~').contains(&c) {
                char::from_u32(c as u32 + FULL_WIDTH_OFFSET).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

pub fn hiragana_to_katakana(text: &str) -> String {
    text.chars()
        .map(|c| {
            if ('ぁ'..='ゖ').contains(&c) {
                char::from_u32(c as u32 + KANA_OFFSET).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

pub fn katakana_to_hiragana(text: &str) -> String {
    text.chars()
        .map(|c| {
            if ('ァ'..='ヶ').contains(&c) {
                char::from_u32(c as u32 - KANA_OFFSET).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// Canonical form used for comparisons: NFKC, lowercase, hiragana.
pub fn fold(text: &str) -> String {
    katakana_to_hiragana(&nfkc(text).to_lowercase())
}

/// A query expanded into its search patterns.
#[derive(Debug, Clone)]
pub struct QueryForms {
    /// The query as typed
    pub original: String,
    /// NFKC form
    pub half_width: String,
    /// Full-width form
    pub full_width: String,
    /// Lowercase form with hiragana shifted to katakana
    pub kana_variant: String,
    /// Original first, then every other variant longest-first
    pub patterns: Vec<String>,
    folded_query: String,
    folded_patterns: Vec<String>,
    query_len: usize,
}

impl QueryForms {
    pub fn new(query: &str) -> Self {
        let original = query.to_string();
        let mut patterns: Vec<String> = Vec::new();

        if query.is_empty() {
            return Self {
                original,
                half_width: String::new(),
                full_width: String::new(),
                kana_variant: String::new(),
                patterns,
                folded_query: String::new(),
                folded_patterns: Vec::new(),
                query_len: 0,
            };
        }

        patterns.push(original.clone());

        let half_width = nfkc(query);
        if half_width != query {
            patterns.push(half_width.clone());
        }

        let full_width = to_full_width(query);
        if full_width != query {
            patterns.push(full_width.clone());
        }

        let lowered = query.to_lowercase();
        if lowered != query {
            patterns.push(lowered.clone());
        }

        let chars: Vec<char> = query.chars().collect();
        if chars.len() >= 2 {
            for c in &chars {
                let single = c.to_string();
                if !c.is_whitespace() && !patterns.contains(&single) {
                    patterns.push(single);
                }
            }
            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                if !patterns.contains(&bigram) {
                    patterns.push(bigram);
                }
            }
        }

        let kana_variant = hiragana_to_katakana(&lowered);
        if kana_variant != lowered {
            patterns.push(kana_variant.clone());
        }

        let hiragana_variant = katakana_to_hiragana(&lowered);
        if hiragana_variant != lowered {
            patterns.push(hiragana_variant);
        }

        let words: Vec<&str> = query.split_whitespace().collect();
        if words.len() > 1 {
            for word in words {
                if !patterns.iter().any(|p| p == word) {
                    patterns.push(word.to_string());
                }
                let word_half = nfkc(word);
                if !patterns.contains(&word_half) {
                    patterns.push(word_half);
                }
            }
        }

        let mut rest: Vec<String> = Vec::new();
        for pattern in patterns.into_iter().skip(1) {
            if pattern != original && !rest.contains(&pattern) {
                rest.push(pattern);
            }
        }
        rest.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let mut patterns = Vec::with_capacity(rest.len() + 1);
        patterns.push(original.clone());
        patterns.extend(rest);

        let folded_patterns = patterns.iter().map(|p| fold(p)).collect();

        Self {
            folded_query: fold(query),
            query_len: chars.len(),
            original,
            half_width,
            full_width,
            kana_variant,
            patterns,
            folded_patterns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Character count of the original query.
    pub fn query_len(&self) -> usize {
        self.query_len
    }

    /// Check whether `text` matches this query.
    ///
    /// Queries of four or more characters must appear whole. Shorter
    /// queries also accept their variants, characters and bigrams, but
    /// never patterns shorter than the query itself (capped at three).
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() || self.is_empty() {
            return false;
        }

        let folded_text = fold(text);

        if self.query_len >= 4 {
            return folded_text.contains(&self.folded_query);
        }

        let min_len = self.query_len.min(3);
        for pattern in &self.folded_patterns {
            let len = pattern.trim().chars().count();
            if len == 0 || len < min_len {
                continue;
            }
            if *pattern == folded_text {
                return true;
            }
            if (len >= 2 || self.query_len == 1) && folded_text.contains(pattern.as_str()) {
                return true;
            }
        }

        false
    }
}
