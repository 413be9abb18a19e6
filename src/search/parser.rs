//! Search query parser using pest grammar.
//!
//! Parses search queries like `invoice "annual report" ext:pdf` into a
//! [`ParsedQuery`] holding the free text and the filters.

use pest::Parser;
use pest_derive::Parser;

use super::filters::*;
use super::SearchHit;
use crate::{AppError, Result};

#[derive(Parser)]
#[grammar = "search/query.pest"]
struct QueryParser;

/// A parsed search query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Words and phrases in input order, joined by single spaces
    pub text: String,
    /// Quoted phrases, without quotes
    pub phrases: Vec<String>,
    /// Parsed filters (ext, size, path)
    pub filters: Vec<Filter>,
}

impl ParsedQuery {
    /// Drop hits rejected by any filter.
    pub fn apply(&self, mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
        if !self.filters.is_empty() {
            hits.retain(|hit| self.filters.iter().all(|f| f.matches(hit)));
        }
        hits
    }

    /// First extension filter, if any.
    pub fn extension(&self) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            Filter::Extension(ext) => Some(ext.as_str()),
            _ => None,
        })
    }
}

/// Parse a search query string into structured query.
///
/// # Examples
///
/// ```
/// use livefind::search::{parse_query, Filter};
///
/// let query = parse_query("report \"q1 sales\" ext:pdf").unwrap();
/// assert_eq!(query.text, "report q1 sales");
/// assert_eq!(query.filters, vec![Filter::Extension("pdf".to_string())]);
/// ```
pub fn parse_query(input: &str) -> Result<ParsedQuery> {
    let mut pairs = QueryParser::parse(Rule::query, input)
        .map_err(|e| AppError::Query(format!("Invalid search syntax: {}", e)))?;

    let mut parsed = ParsedQuery::default();
    let mut terms: Vec<String> = Vec::new();

    let Some(query) = pairs.next() else {
        return Ok(parsed);
    };

    for pair in query.into_inner() {
        match pair.as_rule() {
            Rule::word => terms.push(pair.as_str().to_string()),
            Rule::phrase => {
                let phrase = quoted_inner(pair);
                if !phrase.is_empty() {
                    terms.push(phrase.clone());
                    parsed.phrases.push(phrase);
                }
            }
            Rule::filter => parsed.filters.push(build_filter(pair)?),
            _ => {}
        }
    }

    parsed.text = terms.join(" ");
    Ok(parsed)
}

fn quoted_inner(pair: pest::iterators::Pair<Rule>) -> String {
    pair.into_inner()
        .flatten()
        .find(|p| p.as_rule() == Rule::inner)
        .map(|p| p.as_str().trim().to_string())
        .unwrap_or_default()
}

fn build_filter(pair: pest::iterators::Pair<Rule>) -> Result<Filter> {
    let mut key = String::new();
    let mut value = String::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::filter_key => key = part.as_str().to_lowercase(),
            Rule::quoted => value = quoted_inner(part),
            Rule::bare => value = part.as_str().to_string(),
            _ => {}
        }
    }

    match key.as_str() {
        "ext" => Ok(Filter::Extension(
            value.trim_start_matches('.').to_lowercase(),
        )),
        "size" => parse_size_filter(&value)
            .map(|(op, bytes)| Filter::Size(op, bytes))
            .ok_or_else(|| AppError::Query(format!("Invalid size filter: {}", value))),
        "path" => Ok(Filter::PathScope(value)),
        other => Err(AppError::Query(format!("Unknown filter: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words() {
        let parsed = parse_query("quarterly  invoice").unwrap();
        assert_eq!(parsed.text, "quarterly invoice");
        assert!(parsed.filters.is_empty());
        assert!(parsed.phrases.is_empty());
    }

    #[test]
    fn test_extension_filter() {
        let parsed = parse_query("budget ext:.XLSX").unwrap();
        assert_eq!(parsed.text, "budget");
        assert_eq!(parsed.extension(), Some("xlsx"));
    }

    #[test]
    fn test_quoted_phrase() {
        let parsed = parse_query("\"annual report\" 2024").unwrap();
        assert_eq!(parsed.text, "annual report 2024");
        assert_eq!(parsed.phrases, vec!["annual report".to_string()]);
    }

    #[test]
    fn test_size_and_path_filters() {
        let parsed = parse_query("memo size:>1mb path:\"shared docs\"").unwrap();
        assert_eq!(parsed.text, "memo");
        assert_eq!(
            parsed.filters,
            vec![
                Filter::Size(SizeOp::GreaterThan, 1024 * 1024),
                Filter::PathScope("shared docs".to_string()),
            ]
        );
    }

    #[test]
    fn test_japanese_with_ideographic_space() {
        let parsed = parse_query("見積書\u{3000}ext:pdf").unwrap();
        assert_eq!(parsed.text, "見積書");
        assert_eq!(parsed.extension(), Some("pdf"));
    }

    #[test]
    fn test_bad_size_filter_is_error() {
        assert!(matches!(parse_query("size:>lots"), Err(AppError::Query(_))));
    }

    #[test]
    fn test_unterminated_quote_is_error() {
        assert!(parse_query("\"open ended").is_err());
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse_query("").unwrap();
        assert_eq!(parsed, ParsedQuery::default());
    }

    #[test]
    fn test_apply_filters() {
        use crate::search::{hit, Layer};
        let parsed = parse_query("x ext:pdf").unwrap();
        let hits = vec![
            hit("/a.pdf", Layer::Hot, 1.0),
            hit("/b.txt", Layer::Hot, 1.0),
        ];
        let kept = parsed.apply(hits);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].file_path, "/a.pdf");
    }
}
