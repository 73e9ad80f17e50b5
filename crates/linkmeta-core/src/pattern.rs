//! Pure matchers for source patterns and target criteria.
//!
//! A source pattern is one of:
//!
//! | Form | Example | Matches |
//! |------|---------|---------|
//! | exact path | `Journal/2024-01-01.md` | that document only |
//! | folder prefix | `Journal/` | everything below `Journal/` |
//! | parent folder | `Journal` | documents directly inside `Journal` |
//! | glob | `Daily Notes/*` | see [`matches_glob`] |
//!
//! Glob patterns are anchored at the **end only**: `Daily Notes/*` also
//! matches `Archive/Daily Notes/x.md`. Existing rule sets depend on this.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;

use crate::models::{MetadataSnapshot, Rule};

/// Whether `pattern` contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Translate a glob into an end-anchored regular expression.
///
/// Literal characters are escaped, `*` becomes `.*` and `?` becomes `.`.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

/// Compile a glob pattern. Used by the validator to report bad patterns.
pub fn compile_glob(pattern: &str) -> Result<Regex> {
    Regex::new(&glob_to_regex(pattern))
        .with_context(|| format!("invalid glob pattern '{}'", pattern))
}

/// Glob match, end-anchored. An uncompilable pattern never matches.
pub fn matches_glob(pattern: &str, path: &str) -> bool {
    match compile_glob(pattern) {
        Ok(re) => re.is_match(path),
        Err(_) => false,
    }
}

/// The immediate parent folder of a vault-relative path. Root-level
/// documents report `/`.
pub fn parent_folder(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent,
        _ => "/",
    }
}

/// Whether an edited document at `path` can trigger a rule with `pattern`.
pub fn matches_source(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern == path {
        return true;
    }
    if pattern.ends_with('/') && path.starts_with(pattern) {
        return true;
    }
    if parent_folder(path) == pattern {
        return true;
    }
    if is_glob(pattern) {
        return matches_glob(pattern, path);
    }
    false
}

/// Whether `path` lies in `folder` (at any depth). Globs use [`matches_glob`].
pub fn matches_folder(folder: &str, path: &str) -> bool {
    if is_glob(folder) {
        return matches_glob(folder, path);
    }
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() || folder == "/" {
        return true;
    }
    parent_folder(path) == folder
        || path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn strip_hash(tag: &str) -> &str {
    tag.trim().strip_prefix('#').unwrap_or(tag.trim())
}

/// Tags declared in the frontmatter `tags` (or `tag`) key. Accepts a list or
/// a comma/space separated string.
pub fn frontmatter_tags(snapshot: &MetadataSnapshot) -> Vec<String> {
    let mut tags = Vec::new();
    for key in ["tags", "tag"] {
        match snapshot.frontmatter.get(key) {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(s) = item.as_str() {
                        tags.push(s.trim().to_string());
                    }
                }
            }
            Some(Value::String(s)) => {
                tags.extend(
                    s.split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                );
            }
            _ => {}
        }
    }
    tags
}

/// Whether the document carries `tag`, either in its frontmatter or as an
/// inline annotation. The leading `#` is optional on both sides.
pub fn has_tag(snapshot: &MetadataSnapshot, tag: &str) -> bool {
    let bare = strip_hash(tag);
    if bare.is_empty() {
        return false;
    }

    if frontmatter_tags(snapshot)
        .iter()
        .any(|t| strip_hash(t) == bare)
    {
        return true;
    }

    let hashed = format!("#{}", bare);
    snapshot
        .tags
        .iter()
        .any(|t| t.as_str() == bare || *t == hashed)
}

/// Whether a target satisfies the rule's target criterion: the tag if set,
/// else the folder if set, else every target.
pub fn matches_target(rule: &Rule, target_path: &str, target: &MetadataSnapshot) -> bool {
    if let Some(tag) = rule.target_tag() {
        return has_tag(target, tag);
    }
    if let Some(folder) = rule.target_folder() {
        return matches_folder(folder, target_path);
    }
    true
}
