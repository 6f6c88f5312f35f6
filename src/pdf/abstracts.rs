//! Best-effort abstract recovery from the document text layer.
//!
//! Two-stage heuristic chain: a single multiline regex over the concatenated
//! page text handles simple single-column layouts; when that finds nothing,
//! positioned blocks sorted into approximate reading order handle multi-column
//! layouts where the heading and body are separate text blocks out of document
//! order. Failures are cosmetic; the result degrades to an empty string.

use std::sync::OnceLock;

use regex::Regex;

use super::PageSource;

fn heading_pattern() -> &'static Regex {
    static HEADING_RE: OnceLock<Regex> = OnceLock::new();
    HEADING_RE.get_or_init(|| {
        Regex::new(
            r"(?is)abstract[:\s-]*\n?(.*?)(?:\n\s*(?:keywords|index terms|ccs concepts|author keywords|introduction|1\.|i\.)|\z)",
        )
        .expect("valid abstract regex")
    })
}

fn section_start_pattern() -> &'static Regex {
    static SECTION_RE: OnceLock<Regex> = OnceLock::new();
    SECTION_RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:keywords|index terms|ccs concepts|author keywords|introduction|1\.|i\.)")
            .expect("valid section regex")
    })
}

fn abstract_prefix_pattern() -> &'static Regex {
    static PREFIX_RE: OnceLock<Regex> = OnceLock::new();
    PREFIX_RE.get_or_init(|| Regex::new(r"(?i)^abstract[:\s-]*").expect("valid prefix regex"))
}

/// Extract the abstract from the first `max_pages` pages, or `""` when no
/// heading is found. Never errors.
pub fn extract_abstract(source: &dyn PageSource, max_pages: usize) -> String {
    let pages = source.page_count().min(max_pages);

    let mut buffer: Vec<String> = Vec::new();
    for index in 0..pages {
        buffer.push(source.page_text(index));
    }
    let raw = buffer.join("\n").replace('\r', "\n");

    if let Some(captures) = heading_pattern().captures(&raw) {
        let body = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        return normalize_whitespace(body);
    }

    // Fallback to block parsing when the linear text pass fails.
    let mut chunks: Vec<String> = Vec::new();
    let mut target_found = false;
    for index in 0..pages {
        let mut blocks = source.text_blocks(index);
        // PDF y grows upward; negate for top-to-bottom reading order.
        blocks.sort_by_key(|block| {
            (
                -((block.y * 10.0).round() as i64),
                (block.x * 10.0).round() as i64,
            )
        });
        for block in blocks {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }
            let lowered = text.to_lowercase();
            if !target_found {
                if lowered.starts_with("abstract") {
                    let cleaned = abstract_prefix_pattern().replace(text, "");
                    let cleaned = cleaned.trim();
                    if !cleaned.is_empty() {
                        chunks.push(cleaned.to_string());
                    }
                    target_found = true;
                }
                continue;
            }
            if section_start_pattern().is_match(&lowered) {
                return normalize_whitespace(&chunks.join(" "));
            }
            chunks.push(text.to_string());
        }
    }

    normalize_whitespace(&chunks.join(" "))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::StubSource;
    use crate::pdf::TextBlock;

    #[test]
    fn heading_pass_captures_until_the_next_section() {
        let source = StubSource::from_pages(&[
            "A Title\nAbstract\nWe present a   thing\nthat works.\nKeywords\nstuff, things",
        ]);
        assert_eq!(
            extract_abstract(&source, 2),
            "We present a thing that works."
        );
    }

    #[test]
    fn heading_pass_runs_to_end_of_text_without_a_boundary() {
        let source = StubSource::from_pages(&["Abstract: short and sweet"]);
        assert_eq!(extract_abstract(&source, 2), "short and sweet");
    }

    #[test]
    fn block_pass_reassembles_out_of_order_columns() {
        let blocks = vec![vec![
            TextBlock {
                x: 50.0,
                y: 400.0,
                text: "1. Introduction".to_string(),
            },
            TextBlock {
                x: 50.0,
                y: 700.0,
                text: "Abstract".to_string(),
            },
            TextBlock {
                x: 50.0,
                y: 600.0,
                text: "We present a thing".to_string(),
            },
            TextBlock {
                x: 50.0,
                y: 500.0,
                text: "that works.".to_string(),
            },
        ]];
        let source = StubSource::from_pages(&["no heading in linear text"]).with_blocks(blocks);
        assert_eq!(
            extract_abstract(&source, 2),
            "We present a thing that works."
        );
    }

    #[test]
    fn block_pass_strips_an_inline_heading_prefix() {
        let blocks = vec![vec![
            TextBlock {
                x: 50.0,
                y: 700.0,
                text: "Abstract: We present a thing.".to_string(),
            },
            TextBlock {
                x: 50.0,
                y: 600.0,
                text: "Index Terms something".to_string(),
            },
        ]];
        let source = StubSource::from_pages(&["nothing here"]).with_blocks(blocks);
        assert_eq!(extract_abstract(&source, 2), "We present a thing.");
    }

    #[test]
    fn missing_abstract_degrades_to_empty() {
        let source = StubSource::from_pages(&["no such heading anywhere"]);
        assert_eq!(extract_abstract(&source, 2), "");
    }
}
