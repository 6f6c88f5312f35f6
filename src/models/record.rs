//! Canonical record model and its legacy file representation.

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use serde_json::{json, Map, Value};

/// Column order of the spreadsheet exports.
pub const CSV_COLUMNS: [&str; 6] = [
    "Title",
    "Venue",
    "Publication year",
    "Author list",
    "Abstract",
    "DOI",
];

/// Legacy field names that `update_fields` may target. Anything else is
/// rejected before any mutation.
pub const EDITABLE_COLUMNS: [&str; 6] = CSV_COLUMNS;

/// Stable record identifier: `doi:<doi>` when a DOI is present, else
/// `file:<file name>`, both trimmed and lowercased so the same publication
/// always maps to the same id.
pub fn generate_record_id(doi: &str, file_name: &str) -> String {
    let doi_value = doi.trim().to_lowercase();
    if !doi_value.is_empty() {
        return format!("doi:{doi_value}");
    }
    format!("file:{}", file_name.trim().to_lowercase())
}

/// Accept only values losslessly convertible to an integer year: a JSON
/// integer or a digit string. Anything else records no year.
pub fn coerce_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(number) => number.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(text) => text.trim().parse::<i32>().ok(),
        _ => None,
    }
}

/// One stored publication.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    pub venue: String,
    pub publication_year: Option<i32>,
    /// Comma-joined "Given Family" display strings
    pub author_list: String,
    pub abstract_text: String,
    pub doi: String,
    pub file_name: String,
    pub source_url: String,
    /// Second precision, UTC
    pub saved_at: DateTime<Utc>,
}

impl PaperRecord {
    /// Map to the JSON/CSV schema expected by older clients.
    pub fn to_legacy(&self) -> Value {
        json!({
            "Title": self.title,
            "Venue": self.venue,
            "Publication year": match self.publication_year {
                Some(year) => json!(year),
                None => json!(""),
            },
            "Author list": self.author_list,
            "Abstract": self.abstract_text,
            "DOI": self.doi,
            "file_name": self.file_name,
            "source_url": self.source_url,
            "saved_at": format_saved_at(&self.saved_at),
            "id": self.id,
        })
    }

    /// Rebuild a record from a legacy object. Lenient: missing fields default,
    /// unparseable years and timestamps degrade rather than fail, and a
    /// missing id is re-derived from the DOI / file name.
    pub fn from_legacy(data: &Map<String, Value>) -> Self {
        let text = |key: &str| -> String {
            data.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let doi = text("DOI");
        let file_name = match data.get("file_name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => text("Title"),
        };
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| generate_record_id(&doi, &file_name));

        let saved_at = data
            .get("saved_at")
            .and_then(Value::as_str)
            .and_then(parse_saved_at)
            .unwrap_or_else(now_seconds);

        Self {
            id,
            title: text("Title"),
            venue: text("Venue"),
            publication_year: data.get("Publication year").and_then(coerce_year),
            author_list: text("Author list"),
            abstract_text: text("Abstract"),
            doi,
            file_name,
            source_url: text("source_url"),
            saved_at,
        }
    }
}

/// Current time truncated to whole seconds.
pub(crate) fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

fn format_saved_at(saved_at: &DateTime<Utc>) -> String {
    format!("{}Z", saved_at.format("%Y-%m-%dT%H:%M:%S"))
}

fn parse_saved_at(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
