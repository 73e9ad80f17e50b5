//! Rule selection and validation.
//!
//! [`find_applicable_rules`] is the hot path, called once per resolved
//! link. Validation is run on demand against user-authored rule sets and
//! never blocks processing: an invalid rule is still matched if enabled.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::models::{MetadataSnapshot, Rule, ValidationResult, ValueType};
use crate::pattern::{compile_glob, is_glob, matches_source, matches_target};
use crate::store::DocumentStore;

static FIELD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Enabled rules whose source pattern matches `source` and whose target
/// criterion matches the target, ordered by ascending priority.
///
/// The sort is stable, so rules with equal priority keep their configured
/// order.
pub fn find_applicable_rules<'a>(
    source: &str,
    target_path: &str,
    target: &MetadataSnapshot,
    rules: &'a [Rule],
) -> Vec<&'a Rule> {
    let mut applicable: Vec<&Rule> = rules
        .iter()
        .filter(|r| r.enabled)
        .filter(|r| matches_source(&r.source_pattern, source))
        .filter(|r| matches_target(r, target_path, target))
        .collect();
    applicable.sort_by_key(|r| r.priority);
    applicable
}

/// Check a single rule for configuration errors and suspicious settings.
pub fn validate_rule(rule: &Rule) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if rule.id.trim().is_empty() {
        errors.push("Rule ID is required".to_string());
    }
    if rule.name.trim().is_empty() {
        errors.push("Rule name is required".to_string());
    }

    if rule.source_pattern.trim().is_empty() {
        errors.push("Source pattern is required".to_string());
    } else if is_glob(&rule.source_pattern) {
        if let Err(e) = compile_glob(&rule.source_pattern) {
            errors.push(format!("Invalid source pattern: {:#}", e));
        }
    }

    if rule.update_field.trim().is_empty() {
        errors.push("Update field is required".to_string());
    } else if !FIELD_NAME_RE.is_match(&rule.update_field) {
        errors.push(format!(
            "Update field '{}' must be a valid identifier (letters, digits, underscore; not starting with a digit)",
            rule.update_field
        ));
    }

    if rule.priority < 0 {
        errors.push(format!(
            "Priority must be non-negative (got {})",
            rule.priority
        ));
    }

    match &rule.value_type {
        ValueType::Custom => {
            errors.push("Value type 'custom' is not supported".to_string());
        }
        ValueType::Missing => errors.push("Value type is required".to_string()),
        ValueType::Other(other) => {
            errors.push(format!("Unknown value type '{}'", other));
        }
        _ => {}
    }

    match (rule.target_tag(), rule.target_folder()) {
        (None, None) => warnings.push(
            "No target tag or folder specified - rule will apply to all linked documents"
                .to_string(),
        ),
        (Some(_), Some(_)) => warnings.push(
            "Both target tag and target folder are set - only the tag is used".to_string(),
        ),
        _ => {}
    }

    if let Some(folder) = rule.target_folder() {
        if is_glob(folder) {
            if let Err(e) = compile_glob(folder) {
                errors.push(format!("Invalid target folder pattern: {:#}", e));
            }
        }
    }

    ValidationResult::from_messages(errors, warnings)
}

/// Check a whole rule set: duplicate ids are errors, rules that would
/// compete for the same field on the same edges are warnings.
///
/// Conflict detection compares every pair of rules on
/// `(source_pattern, target_tag, target_folder, update_field)` only; value
/// type and priority are ignored.
pub fn validate_rule_set(rules: &[Rule]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut duplicates: Vec<&str> = Vec::new();
    for rule in rules {
        let count = counts.entry(rule.id.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(rule.id.as_str());
        }
    }
    if !duplicates.is_empty() {
        errors.push(format!("Duplicate rule IDs found: {}", duplicates.join(", ")));
    }

    // O(n²); rule sets are small and hand-written.
    for (i, a) in rules.iter().enumerate() {
        for b in &rules[i + 1..] {
            if a.source_pattern == b.source_pattern
                && a.target_tag() == b.target_tag()
                && a.target_folder() == b.target_folder()
                && a.update_field == b.update_field
            {
                warnings.push(format!(
                    "Rules \"{}\" and \"{}\" may conflict: both update '{}' for the same source and target",
                    a.label(),
                    b.label(),
                    a.update_field
                ));
            }
        }
    }

    ValidationResult::from_messages(errors, warnings)
}

/// All documents an edit to which could trigger a rule with `pattern`.
pub async fn files_matching_source(
    store: &dyn DocumentStore,
    pattern: &str,
) -> Result<Vec<String>> {
    Ok(store
        .list_documents()
        .await?
        .into_iter()
        .filter(|path| matches_source(pattern, path))
        .collect())
}

/// All documents carrying `tag` in frontmatter or inline. Documents whose
/// metadata cannot be read are skipped.
pub async fn files_with_tag(store: &dyn DocumentStore, tag: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for path in store.list_documents().await? {
        match store.metadata(&path).await {
            Ok(snapshot) if crate::pattern::has_tag(&snapshot, tag) => out.push(path),
            Ok(_) => {}
            Err(e) => tracing::debug!(path = %path, error = %e, "skipping unreadable document"),
        }
    }
    Ok(out)
}

/// All documents inside `folder` (exact parent, prefix, or glob).
pub async fn files_in_folder(store: &dyn DocumentStore, folder: &str) -> Result<Vec<String>> {
    Ok(store
        .list_documents()
        .await?
        .into_iter()
        .filter(|path| crate::pattern::matches_folder(folder, path))
        .collect())
}
