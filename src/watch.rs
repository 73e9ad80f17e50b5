//! Polling vault watcher.
//!
//! Every `watch.poll_interval_ms` the vault is rescanned and compared with
//! the previous scan. Differences become [`WatchEvent`]s fed to the
//! [`Scheduler`] hooks. A file that disappears while another with the same
//! size and modification time appears is reported as a rename.
//!
//! The config file is polled too; when it changes, the new rules and
//! options are handed to the scheduler.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{load_config, Config};
use crate::scheduler::Scheduler;
use crate::vault::{FileStamp, VaultStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Modified(String),
    Renamed { from: String, to: String },
    Deleted(String),
}

/// Events that turn `old` into `new`: renames first, then modifications
/// (including new files), then deletions. Each group is in path order.
pub fn diff_snapshots(
    old: &BTreeMap<String, FileStamp>,
    new: &BTreeMap<String, FileStamp>,
) -> Vec<WatchEvent> {
    let mut created: Vec<&String> = new.keys().filter(|p| !old.contains_key(*p)).collect();
    let removed: Vec<&String> = old.keys().filter(|p| !new.contains_key(*p)).collect();

    let mut renames = Vec::new();
    let mut deletions = Vec::new();
    for path in removed {
        let stamp = &old[path];
        match created.iter().position(|c| &new[*c] == stamp) {
            Some(i) => {
                let to = created.remove(i);
                renames.push(WatchEvent::Renamed {
                    from: path.clone(),
                    to: to.clone(),
                });
            }
            None => deletions.push(WatchEvent::Deleted(path.clone())),
        }
    }

    let mut modified: Vec<&String> = new
        .iter()
        .filter(|(path, stamp)| old.get(*path).is_some_and(|prev| prev != *stamp))
        .map(|(path, _)| path)
        .collect();
    modified.extend(created);
    modified.sort();

    let mut events = renames;
    events.extend(modified.into_iter().map(|p| WatchEvent::Modified(p.clone())));
    events.extend(deletions);
    events
}

/// Route one event to the scheduler.
pub async fn dispatch(scheduler: &Scheduler, event: WatchEvent) {
    match event {
        WatchEvent::Modified(path) => {
            scheduler.on_modify(&path);
        }
        WatchEvent::Renamed { from, to } => {
            info!(from = %from, to = %to, "document renamed");
            scheduler.on_rename(&from, &to);
        }
        WatchEvent::Deleted(path) => {
            let report = scheduler.on_delete(&path).await;
            info!(path = %path, fields_updated = report.fields_updated, "document deleted");
        }
    }
}

fn config_stamp(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Watch the vault until Ctrl-C, then cancel pending passes and let
/// running ones finish.
pub async fn run_watch(config_path: &Path, config: Config) -> Result<()> {
    let store = Arc::new(VaultStore::open(&config.vault)?);
    let scheduler = Scheduler::new(store.clone(), config.rule_set());

    let indexed = scheduler.seed_known_links().await?;
    let mut previous = store.scan()?;
    let mut config_modified = config_stamp(config_path);

    println!(
        "Watching {} ({} documents, {} rules). Press Ctrl-C to stop.",
        store.root().display(),
        indexed,
        config.rules.iter().filter(|r| r.enabled).count()
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(config.watch.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current_stamp = config_stamp(config_path);
                if current_stamp != config_modified {
                    config_modified = current_stamp;
                    match load_config(config_path) {
                        Ok(reloaded) => {
                            scheduler.update_config(reloaded.rule_set());
                            info!(rules = reloaded.rules.len(), "configuration reloaded");
                        }
                        Err(e) => warn!(error = %format!("{:#}", e), "keeping previous configuration"),
                    }
                }

                let current = match store.scan() {
                    Ok(current) => current,
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "vault scan failed");
                        continue;
                    }
                };
                for event in diff_snapshots(&previous, &current) {
                    debug!(?event, "vault change");
                    dispatch(&scheduler, event).await;
                }
                previous = current;
            }
            _ = &mut ctrl_c => break,
        }
    }

    let cancelled = scheduler.shutdown().await;
    println!("Stopped. {} pending passes cancelled.", cancelled);
    Ok(())
}
