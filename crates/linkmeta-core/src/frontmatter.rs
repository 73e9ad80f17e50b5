//! YAML frontmatter codec.
//!
//! A document's metadata block is the YAML between an opening `---` on the
//! first line and the next `---` (or `...`) line. It is parsed into an
//! order-preserving JSON map so that rewriting a document keeps the user's
//! key order.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::models::Frontmatter;

/// Split a document into its raw frontmatter block and body.
///
/// Returns `None` for the block when the document has no frontmatter.
pub fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }

    // Unterminated block: treat the whole file as body.
    (None, text)
}

/// Parse a YAML block into a frontmatter map. Empty blocks parse as empty.
pub fn parse_yaml(yaml: &str) -> Result<Frontmatter> {
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::new());
    }
    let value: Value = serde_yaml::from_str(yaml).context("Failed to parse frontmatter YAML")?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Frontmatter::new()),
        other => bail!("Frontmatter must be a mapping, found {}", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Parse a full document into frontmatter and body.
pub fn parse_document(text: &str) -> Result<(Frontmatter, &str)> {
    match split_frontmatter(text) {
        (Some(yaml), body) => Ok((parse_yaml(yaml)?, body)),
        (None, body) => Ok((Frontmatter::new(), body)),
    }
}

/// Render frontmatter and body back into a document.
pub fn render_document(frontmatter: &Frontmatter, body: &str) -> Result<String> {
    if frontmatter.is_empty() {
        return Ok(format!("---\n---\n{}", body));
    }
    let yaml = serde_yaml::to_string(frontmatter).context("Failed to serialize frontmatter")?;
    Ok(format!("---\n{}---\n{}", yaml, body))
}
