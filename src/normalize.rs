//! Translate Crossref payloads into canonical records.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::crossref::{CrossrefAuthor, CrossrefWork};
use crate::models::{coerce_year, generate_record_id, now_seconds, PaperRecord};
use crate::pdf::{extract_abstract, PageSource, DEFAULT_SCAN_PAGES};

fn tag_pattern() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

/// Remove `<...>` markup (Crossref abstracts arrive JATS-tagged).
pub fn strip_tags(text: &str) -> String {
    tag_pattern().replace_all(text, "").trim().to_string()
}

fn display_name(author: &CrossrefAuthor) -> String {
    let given = author.given.as_deref().unwrap_or("").trim();
    let family = author.family.as_deref().unwrap_or("").trim();
    [given, family]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a raw payload (plus the DOI fallback the caller already resolved and
/// an optional document handle for the abstract fallback) into a
/// [`PaperRecord`]. Pure except for the abstract fallback.
pub fn normalize_metadata(
    work: &CrossrefWork,
    file_name: &str,
    doi_fallback: Option<&str>,
    source: Option<&dyn PageSource>,
) -> PaperRecord {
    let title = work.title.first().cloned().unwrap_or_default();
    let venue = work.container_title.first().cloned().unwrap_or_default();

    let authors: Vec<String> = work
        .author
        .iter()
        .map(display_name)
        .filter(|name| !name.is_empty())
        .collect();
    let author_list = authors.join(", ");

    let publication_year = work
        .issued
        .date_parts
        .first()
        .and_then(|parts| parts.first())
        .and_then(coerce_year);

    // The payload's own DOI wins over the candidate the caller resolved.
    let doi = work
        .doi
        .as_deref()
        .filter(|doi| !doi.trim().is_empty())
        .or(doi_fallback)
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut abstract_text = work
        .abstract_text
        .as_ref()
        .and_then(Value::as_str)
        .map(strip_tags)
        .unwrap_or_default();
    if abstract_text.is_empty() {
        if let Some(source) = source {
            abstract_text = extract_abstract(source, DEFAULT_SCAN_PAGES);
        }
    }

    PaperRecord {
        id: generate_record_id(&doi, file_name),
        title,
        venue,
        publication_year,
        author_list,
        abstract_text,
        doi,
        file_name: file_name.to_string(),
        source_url: work.url.clone().unwrap_or_default(),
        saved_at: now_seconds(),
    }
}
