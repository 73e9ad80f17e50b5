//! The per-document processing pass.
//!
//! For a source document: enumerate its outgoing links (deduplicated),
//! resolve each to a target, select the applicable rules, and for each rule
//! in priority order generate a value and merge it into the target's
//! frontmatter. Every rule application is its own read-modify-write, so a
//! later rule sees what an earlier rule wrote.
//!
//! Failures are isolated: a rule that fails is logged and counted, and the
//! pass continues with the next rule, target, or document.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::extract::{extract_date, extract_title};
use crate::links::link_to;
use crate::merge::{append_history, merge_value, remove_from_metadata};
use crate::models::{Frontmatter, ProcessReport, ProcessingContext, ProcessingOptions, Rule};
use crate::rules::find_applicable_rules;
use crate::store::DocumentStore;
use crate::value::generate_value;

/// What a single rule application did to its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub generated: bool,
    pub field_updated: bool,
    pub history_appended: bool,
}

/// Resolved, deduplicated outgoing link targets of `path`, excluding itself.
pub async fn outgoing_targets(store: &dyn DocumentStore, path: &str) -> Result<Vec<String>> {
    let snapshot = store.metadata(path).await?;
    let mut targets: Vec<String> = Vec::new();
    let mut seen_raw: Vec<&str> = Vec::new();

    for raw in &snapshot.links {
        if seen_raw.contains(&raw.as_str()) {
            continue;
        }
        seen_raw.push(raw);

        match store.resolve_link(raw, path).await {
            Some(target) if target != path => {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            Some(_) => {}
            None => debug!(source = %path, link = %raw, "unresolved link"),
        }
    }

    Ok(targets)
}

/// Apply one rule to one (source, target) edge.
///
/// Returns early without touching the target when the rule generates no
/// value. History is appended whenever it is enabled and a value was
/// generated, whether or not the merge changed the field.
pub async fn apply_rule(
    store: &dyn DocumentStore,
    ctx: &ProcessingContext<'_>,
    options: &ProcessingOptions,
) -> Result<RuleOutcome> {
    let Some(candidate) = generate_value(ctx) else {
        debug!(rule = %ctx.rule.label(), target = %ctx.target_path, "no value generated");
        return Ok(RuleOutcome::default());
    };

    let rule = ctx.rule;
    let record_history = rule.history_enabled(options);
    let now = Utc::now();
    let mut outcome = RuleOutcome {
        generated: true,
        ..Default::default()
    };

    store
        .update_metadata(ctx.target_path, &mut |fm: &mut Frontmatter| {
            let field = rule.update_field.as_str();
            if let Some(merged) = merge_value(fm.get(field), &candidate, &rule.value_type) {
                if fm.get(field) != Some(&merged) {
                    fm.insert(field.to_string(), merged);
                    outcome.field_updated = true;
                }
            }
            if record_history && append_history(fm, rule, &candidate, ctx.source_path, now) {
                outcome.history_appended = true;
            }
        })
        .await?;

    debug!(
        rule = %rule.label(),
        source = %ctx.source_path,
        target = %ctx.target_path,
        field = %rule.update_field,
        updated = outcome.field_updated,
        history = outcome.history_appended,
        "rule applied"
    );

    Ok(outcome)
}

/// Run the full pass for one source document.
///
/// Errors reading the source itself are returned; errors on individual
/// targets or rules are logged and counted in the report.
pub async fn process_file(
    store: &dyn DocumentStore,
    path: &str,
    rules: &[Rule],
    options: &ProcessingOptions,
) -> Result<ProcessReport> {
    let mut report = ProcessReport {
        documents: 1,
        ..Default::default()
    };

    let snapshot = store.metadata(path).await?;
    let targets = outgoing_targets(store, path).await?;
    report.links = targets.len();
    if targets.is_empty() {
        return Ok(report);
    }

    let date = extract_date(path, &snapshot, &options.date_format);
    let title = extract_title(path, &snapshot);

    for target in &targets {
        let target_meta = match store.metadata(target).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(source = %path, target = %target, error = %format!("{:#}", e), "cannot read link target");
                report.errors += 1;
                continue;
            }
        };

        for rule in find_applicable_rules(path, target, &target_meta, rules) {
            let ctx = ProcessingContext {
                source_path: path,
                target_path: target,
                extracted_date: date.as_deref(),
                extracted_title: title.as_deref(),
                rule,
            };
            match apply_rule(store, &ctx, options).await {
                Ok(outcome) => {
                    if outcome.generated {
                        report.rule_applications += 1;
                    }
                    if outcome.field_updated {
                        report.fields_updated += 1;
                    }
                    if outcome.history_appended {
                        report.history_entries += 1;
                    }
                    if (outcome.field_updated || outcome.history_appended)
                        && !report.updated_targets.contains(target)
                    {
                        report.updated_targets.push(target.clone());
                    }
                }
                Err(e) => {
                    warn!(
                        rule = %rule.label(),
                        source = %path,
                        target = %target,
                        error = %format!("{:#}", e),
                        "rule application failed"
                    );
                    report.errors += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Process every document in the store, one at a time.
///
/// `on_progress(done, total, path)` is called after each document. A
/// document that fails is logged and counted; the run continues.
pub async fn process_all_files(
    store: &dyn DocumentStore,
    rules: &[Rule],
    options: &ProcessingOptions,
    on_progress: &mut (dyn FnMut(usize, usize, &str) + Send),
) -> Result<ProcessReport> {
    let paths = store.list_documents().await?;
    let total = paths.len();
    let mut report = ProcessReport::default();

    for (i, path) in paths.iter().enumerate() {
        match process_file(store, path, rules, options).await {
            Ok(file_report) => report.absorb(file_report),
            Err(e) => {
                warn!(path = %path, error = %format!("{:#}", e), "document processing failed");
                report.documents += 1;
                report.errors += 1;
            }
        }
        on_progress(i + 1, total, path);
    }

    info!(
        documents = report.documents,
        fields_updated = report.fields_updated,
        errors = report.errors,
        "processed all documents"
    );
    Ok(report)
}

/// Undo link values written by `source` into targets it no longer links to.
///
/// For each removed target, every rule applicable to (source, target)
/// has the source's link reference stripped from its field. Targets that no
/// longer exist are skipped.
pub async fn process_removed_links(
    store: &dyn DocumentStore,
    source: &str,
    removed_targets: &[String],
    rules: &[Rule],
) -> ProcessReport {
    let mut report = ProcessReport::default();
    let link = link_to(source);

    for target in removed_targets {
        if !store.exists(target).await {
            continue;
        }
        let target_meta = match store.metadata(target).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(target = %target, error = %format!("{:#}", e), "cannot read former link target");
                report.errors += 1;
                continue;
            }
        };

        for rule in find_applicable_rules(source, target, &target_meta, rules) {
            let field = rule.update_field.as_str();
            let result = store
                .update_metadata(target, &mut |fm: &mut Frontmatter| {
                    remove_from_metadata(fm, field, &link);
                })
                .await;
            match result {
                Ok(true) => {
                    report.fields_updated += 1;
                    if !report.updated_targets.contains(target) {
                        report.updated_targets.push(target.clone());
                    }
                    debug!(source = %source, target = %target, field = %field, "removed stale link");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(target = %target, field = %field, error = %format!("{:#}", e), "link cleanup failed");
                    report.errors += 1;
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueType;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn rule(id: &str, field: &str, value_type: ValueType, priority: i64) -> Rule {
        Rule {
            id: id.into(),
            name: id.into(),
            source_pattern: "Daily Notes/*".into(),
            target_tag: Some("#movie".into()),
            target_folder: None,
            update_field: field.into(),
            value_type,
            priority,
            enabled: true,
            preserve_history: None,
        }
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert("Daily Notes/2024-03-10.md", "Watched [[Alien]] and [[Alien|again]] and [[Nowhere]].\n");
        store.insert("Alien.md", "---\ntags: [movie]\n---\n# Alien\n");
        store
    }

    #[tokio::test]
    async fn sets_date_on_tagged_target() {
        let store = store();
        let rules = vec![rule("w", "lastWatched", ValueType::Date, 1)];
        let report = process_file(&store, "Daily Notes/2024-03-10.md", &rules, &ProcessingOptions::default())
            .await
            .unwrap();
        assert_eq!(report.links, 1);
        assert_eq!(report.fields_updated, 1);
        assert_eq!(report.updated_targets, vec!["Alien.md".to_string()]);
        assert_eq!(store.frontmatter("Alien.md").unwrap()["lastWatched"], json!("2024-03-10"));
    }

    #[tokio::test]
    async fn later_rules_see_earlier_writes() {
        let store = store();
        let rules = vec![
            rule("second", "seen", ValueType::AppendUniqueLink, 2),
            rule("first", "seen", ValueType::ReplaceLink, 1),
        ];
        process_file(&store, "Daily Notes/2024-03-10.md", &rules, &ProcessingOptions::default())
            .await
            .unwrap();
        // replace writes a scalar, then unique-append sees it and does nothing.
        assert_eq!(store.frontmatter("Alien.md").unwrap()["seen"], json!("[[2024-03-10]]"));
    }

    #[tokio::test]
    async fn history_recorded_even_when_merge_keeps_current() {
        let store = InMemoryStore::new();
        store.insert("Daily Notes/2024-03-10.md", "[[Alien]]");
        store.insert("Alien.md", "---\ntags: [movie]\nlastWatched: 2024-05-01\n---\n");
        let mut r = rule("w", "lastWatched", ValueType::Date, 1);
        r.preserve_history = Some(true);

        let report = process_file(&store, "Daily Notes/2024-03-10.md", &[r], &ProcessingOptions::default())
            .await
            .unwrap();
        assert_eq!(report.fields_updated, 0);
        assert_eq!(report.history_entries, 1);
        let fm = store.frontmatter("Alien.md").unwrap();
        assert_eq!(fm["lastWatched"], json!("2024-05-01"));
        assert_eq!(fm["watchHistory"], json!(["2024-03-10"]));
    }

    #[tokio::test]
    async fn broken_target_does_not_stop_the_pass() {
        let store = InMemoryStore::new();
        store.insert("Daily Notes/2024-03-10.md", "[[Broken]] [[Alien]]");
        store.insert("Broken.md", "---\n- not\n- a map\n---\n");
        store.insert("Alien.md", "---\ntags: [movie]\n---\n");
        let rules = vec![rule("w", "lastWatched", ValueType::Date, 1)];

        let report = process_file(&store, "Daily Notes/2024-03-10.md", &rules, &ProcessingOptions::default())
            .await
            .unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.fields_updated, 1);
    }

    #[tokio::test]
    async fn process_all_reports_progress_for_every_document() {
        let store = store();
        let rules = vec![rule("w", "lastWatched", ValueType::Date, 1)];
        let mut seen = Vec::new();
        let report = process_all_files(&store, &rules, &ProcessingOptions::default(), &mut |done: usize, total: usize, path: &str| {
            seen.push((done, total, path.to_string()));
        })
        .await
        .unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, 2);
        assert_eq!(seen[1].1, 2);
    }

    #[tokio::test]
    async fn removed_links_are_cleaned_up() {
        let store = InMemoryStore::new();
        store.insert("Daily Notes/2024-03-10.md", "");
        store.insert("Alien.md", "---\ntags: [movie]\nseen:\n  - \"[[2024-03-10]]\"\n  - \"[[Other]]\"\n---\n");
        let rules = vec![rule("s", "seen", ValueType::AppendLink, 1)];

        let report = process_removed_links(&store, "Daily Notes/2024-03-10.md", &["Alien.md".to_string()], &rules).await;
        assert_eq!(report.fields_updated, 1);
        assert_eq!(store.frontmatter("Alien.md").unwrap()["seen"], json!(["[[Other]]"]));
    }
}
