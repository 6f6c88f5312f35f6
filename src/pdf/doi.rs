//! DOI candidate scanning over extracted page text.

use std::sync::OnceLock;

use regex::Regex;

use super::PageSource;

fn doi_pattern() -> &'static Regex {
    static DOI_RE: OnceLock<Regex> = OnceLock::new();
    DOI_RE.get_or_init(|| Regex::new(r#"\b10\.\d{4,9}/[^\s"<>]+\b"#).expect("valid DOI regex"))
}

/// Scan free text for DOI-shaped substrings: trailing punctuation stripped,
/// case-folded, first-seen order, duplicates removed. An empty result is a
/// normal outcome, not an error.
pub fn scan_dois(text: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for found in doi_pattern().find_iter(text) {
        let cleaned = found
            .as_str()
            .trim()
            .trim_end_matches(['.', ',', ';'])
            .to_lowercase();
        if !cleaned.is_empty() && !candidates.iter().any(|existing| *existing == cleaned) {
            candidates.push(cleaned);
        }
    }
    candidates
}

/// Ordered, deduplicated DOI candidates from the first `max_pages` pages.
pub fn extract_doi_candidates(source: &dyn PageSource, max_pages: usize) -> Vec<String> {
    let mut text = String::new();
    for index in 0..source.page_count().min(max_pages) {
        text.push_str(&source.page_text(index));
        text.push('\n');
    }
    scan_dois(&text)
}
