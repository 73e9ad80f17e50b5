//! `linkmeta process` and `linkmeta process-all`.

use anyhow::{bail, Result};
use linkmeta_core::models::ProcessReport;
use linkmeta_core::processor::{process_all_files, process_file};
use linkmeta_core::store::DocumentStore;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::progress::{ProgressEvent, ProgressMode};
use crate::vault::VaultStore;

/// Turn a user-supplied path (absolute, vault-relative, or relative to the
/// current directory) into a vault-relative document path.
pub fn vault_relative(store: &VaultStore, input: &str) -> String {
    let candidate = Path::new(input);
    let stripped = candidate
        .strip_prefix(store.root())
        .map(Path::to_path_buf)
        .ok()
        .or_else(|| {
            let cwd_joined = std::env::current_dir().ok()?.join(candidate);
            let root = std::fs::canonicalize(store.root()).ok()?;
            let full = std::fs::canonicalize(cwd_joined).ok()?;
            full.strip_prefix(&root).map(Path::to_path_buf).ok()
        })
        .unwrap_or_else(|| candidate.to_path_buf());

    stripped
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn print_report(report: &ProcessReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("documents:       {}", report.documents);
    println!("links:           {}", report.links);
    println!("rules applied:   {}", report.rule_applications);
    println!("fields updated:  {}", report.fields_updated);
    println!("history entries: {}", report.history_entries);
    println!("errors:          {}", report.errors);
    for target in &report.updated_targets {
        println!("  updated {}", target);
    }
    Ok(())
}

/// Process one document now.
pub async fn run_process(config: &Config, path: &str, json: bool) -> Result<ProcessReport> {
    let store = VaultStore::open(&config.vault)?;
    let rel = vault_relative(&store, path);
    if !store.exists(&rel).await {
        bail!("Document not found in vault: {}", rel);
    }

    let report = process_file(&store, &rel, &config.rules, &config.options).await?;
    info!(path = %rel, fields_updated = report.fields_updated, "processed document");
    print_report(&report, json)?;
    Ok(report)
}

/// Process every document in the vault, reporting progress on stderr.
pub async fn run_process_all(config: &Config, mode: ProgressMode, json: bool) -> Result<ProcessReport> {
    let store = VaultStore::open(&config.vault)?;
    let reporter = mode.reporter();

    reporter.report(ProgressEvent::Scanning);
    let mut on_progress = |done: usize, total: usize, path: &str| {
        reporter.report(ProgressEvent::Processing {
            n: done as u64,
            total: total as u64,
            path: path.to_string(),
        });
    };
    let report = process_all_files(&store, &config.rules, &config.options, &mut on_progress).await?;

    reporter.report(ProgressEvent::Done {
        documents: report.documents as u64,
        updated: report.fields_updated as u64,
        errors: report.errors as u64,
    });
    print_report(&report, json)?;
    Ok(report)
}
