//! Merging candidate values into target metadata.
//!
//! [`merge_value`] decides the new field value; `None` means the field is
//! left untouched. History is recorded separately by [`append_history`] so
//! that an observation can be logged even when the merge keeps the current
//! value. [`remove_from_metadata`] undoes link values when a link goes away.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::extract::date_of;
use crate::models::{Frontmatter, Rule, ValueType};

/// Combine `candidate` with the field's `current` value.
pub fn merge_value(current: Option<&Value>, candidate: &Value, value_type: &ValueType) -> Option<Value> {
    // `field:` with no value reads as null; treat it as absent.
    let current = current.filter(|v| !v.is_null());

    match value_type {
        ValueType::ReplaceLink => Some(candidate.clone()),
        ValueType::AppendLink => Some(append(current, candidate)),
        ValueType::AppendUniqueLink => {
            let duplicate = match current {
                Some(Value::Array(items)) => items.iter().any(|item| same_entry(item, candidate)),
                Some(scalar) => same_entry(scalar, candidate),
                None => false,
            };
            if duplicate {
                None
            } else {
                Some(append(current, candidate))
            }
        }
        ValueType::Date | ValueType::DateAndTitle => merge_by_recency(current, candidate),
        ValueType::Custom | ValueType::Missing | ValueType::Other(_) => None,
    }
}

fn append(current: Option<&Value>, candidate: &Value) -> Value {
    match current {
        Some(Value::Array(items)) => {
            let mut items = items.clone();
            items.push(candidate.clone());
            Value::Array(items)
        }
        Some(scalar) => Value::Array(vec![scalar.clone(), candidate.clone()]),
        None => Value::Array(vec![candidate.clone()]),
    }
}

/// Link identity of an entry: the string itself, or an object's `source`.
fn link_key(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("source").and_then(Value::as_str),
        _ => None,
    }
}

fn same_entry(a: &Value, b: &Value) -> bool {
    match (link_key(a), link_key(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// The candidate replaces the current value only if it is strictly more
/// recent. An unparseable side loses to a parseable one; if neither parses
/// the current value is kept.
fn merge_by_recency(current: Option<&Value>, candidate: &Value) -> Option<Value> {
    let candidate_date = date_of(candidate);
    let Some(current) = current else {
        return candidate_date.map(|_| candidate.clone());
    };

    match (date_of(current), candidate_date) {
        (Some(existing), Some(incoming)) if incoming > existing => Some(candidate.clone()),
        (Some(_), Some(_)) => None,
        (None, Some(_)) => Some(candidate.clone()),
        (Some(_), None) | (None, None) => None,
    }
}

/// Name of the history field for `field`.
pub fn history_field_name(field: &str) -> String {
    match field {
        "lastWatched" => "watchHistory".to_string(),
        "lastRead" => "readHistory".to_string(),
        other => format!("{}History", other),
    }
}

fn is_date_shortcut(field: &str) -> bool {
    matches!(field, "lastWatched" | "lastRead")
}

/// Append a history entry for `candidate` under the rule's history field.
///
/// `lastWatched` and `lastRead` record bare date strings, deduplicated.
/// Every other field records `{field, value, timestamp, sourceContext}`
/// entries, never deduplicated. Returns whether the frontmatter changed.
pub fn append_history(
    frontmatter: &mut Frontmatter,
    rule: &Rule,
    candidate: &Value,
    source_path: &str,
    now: DateTime<Utc>,
) -> bool {
    let field = rule.update_field.as_str();
    let history_key = history_field_name(field);

    let shortcut_date = if is_date_shortcut(field) {
        date_of(candidate).map(|d| d.format("%Y-%m-%d").to_string())
    } else {
        None
    };

    let slot = frontmatter
        .entry(history_key)
        .or_insert_with(|| Value::Array(Vec::new()));
    let mut changed = false;
    if !slot.is_array() {
        let previous = slot.take();
        changed = !previous.is_null();
        *slot = Value::Array(if previous.is_null() { Vec::new() } else { vec![previous] });
    }
    let Some(entries) = slot.as_array_mut() else {
        return changed;
    };

    match shortcut_date {
        Some(date) => {
            let entry = Value::String(date);
            if !entries.contains(&entry) {
                entries.push(entry);
                changed = true;
            }
        }
        None => {
            entries.push(json!({
                "field": field,
                "value": candidate,
                "timestamp": now.to_rfc3339_opts(SecondsFormat::Secs, true),
                "sourceContext": source_path,
            }));
            changed = true;
        }
    }

    changed
}

/// Remove every reference to `link` from `field`.
///
/// Sequence fields drop matching entries (plain links or objects whose
/// `source` is the link) and are deleted when they become empty. Scalar
/// fields are deleted if they equal the link. Returns whether anything was
/// removed.
pub fn remove_from_metadata(frontmatter: &mut Frontmatter, field: &str, link: &str) -> bool {
    let now_empty = match frontmatter.get_mut(field) {
        Some(Value::Array(items)) => {
            let before = items.len();
            items.retain(|item| link_key(item) != Some(link));
            if items.len() == before {
                return false;
            }
            items.is_empty()
        }
        Some(Value::String(s)) if s == link => true,
        _ => return false,
    };

    if now_empty {
        frontmatter.shift_remove(field);
    }
    true
}
