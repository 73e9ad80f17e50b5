//! Date and title extraction from a source document.
//!
//! These are deliberately simple heuristics. The engine only relies on
//! [`extract_date`] returning either a `YYYY-MM-DD` string or nothing.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::links::file_stem;
use crate::models::MetadataSnapshot;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap());

const ISO_FORMAT: &str = "%Y-%m-%d";

/// Parse a calendar date from a metadata string.
///
/// Accepts `YYYY-MM-DD` and strings that start with it followed by a time
/// part (`2024-03-10T09:00:00Z`, `2024-03-10 09:00`).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10)?;
    match s[10..].chars().next() {
        None | Some('T') | Some(' ') => {}
        Some(_) => return None,
    }
    NaiveDate::parse_from_str(head, ISO_FORMAT).ok()
}

/// The calendar date carried by a metadata value: a date string, or an
/// object with a `date` key.
pub fn date_of(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Object(map) => map.get("date").and_then(Value::as_str).and_then(parse_date),
        _ => None,
    }
}

/// The date a source document refers to, as `YYYY-MM-DD`.
///
/// Tries, in order: the frontmatter `date` key, an ISO date inside the file
/// name, the whole file name parsed with `date_format`, then the creation
/// time.
pub fn extract_date(path: &str, snapshot: &MetadataSnapshot, date_format: &str) -> Option<String> {
    let from_frontmatter = snapshot
        .frontmatter
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_date);

    let stem = file_stem(path);
    let from_name = || {
        ISO_DATE_RE
            .captures_iter(stem)
            .find_map(|cap| NaiveDate::parse_from_str(&cap[1], ISO_FORMAT).ok())
    };
    let from_format = || NaiveDate::parse_from_str(stem, date_format).ok();
    let from_created = || snapshot.created.map(|c| c.date_naive());

    from_frontmatter
        .or_else(from_name)
        .or_else(from_format)
        .or_else(from_created)
        .map(|d| d.format(ISO_FORMAT).to_string())
}

/// A human title for a source document: frontmatter `title`, else the
/// first level-1 heading, else the file name.
pub fn extract_title(path: &str, snapshot: &MetadataSnapshot) -> Option<String> {
    if let Some(title) = snapshot
        .frontmatter
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(title.to_string());
    }

    if let Some(heading) = snapshot.headings.iter().find(|h| h.level == 1) {
        return Some(heading.text.clone());
    }

    let stem = file_stem(path);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
