//! Candidate value generation.
//!
//! | Value type | Candidate |
//! |------------|-----------|
//! | `date` | extracted date string |
//! | `date_and_title` | `{date, title, source}`, or the bare date without a title |
//! | `append_link`, `append_unique_link`, `replace_link` | `[[source]]` link |
//! | anything else | nothing |

use serde_json::{json, Value};

use crate::links::link_to;
use crate::models::{ProcessingContext, ValueType};

/// Produce the candidate value for one rule application, or `None` when the
/// rule has nothing to write.
pub fn generate_value(ctx: &ProcessingContext<'_>) -> Option<Value> {
    match &ctx.rule.value_type {
        ValueType::Date => ctx.extracted_date.map(|d| Value::String(d.to_string())),
        ValueType::DateAndTitle => match (ctx.extracted_date, ctx.extracted_title) {
            (Some(date), Some(title)) => Some(json!({
                "date": date,
                "title": title,
                "source": link_to(ctx.source_path),
            })),
            (Some(date), None) => Some(Value::String(date.to_string())),
            _ => None,
        },
        ValueType::AppendLink | ValueType::AppendUniqueLink | ValueType::ReplaceLink => {
            Some(Value::String(link_to(ctx.source_path)))
        }
        ValueType::Custom | ValueType::Missing | ValueType::Other(_) => None,
    }
}
