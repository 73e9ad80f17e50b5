//! Debounced per-document processing.
//!
//! Each path has at most one pending task. Scheduling a path that already
//! has one replaces the entry and aborts the old task, so only the last
//! edit in a burst is processed. A task that wakes up removes its own entry
//! (matched by generation) before running; if the entry is gone or belongs
//! to a newer task, it exits without processing.
//!
//! The scheduler also remembers each processed document's outgoing link
//! targets. When `update_on_delete` is on, targets that disappear from a
//! document (or every target of a deleted document) have the document's
//! link reference removed from their metadata.
//!
//! Passes write through a `MarkingStore`, which flags a target as
//! self-written before the write reaches the underlying store. The next
//! modification event for that target is then ignored once.
//!
//! [`Scheduler::shutdown`] cancels pending timers and waits for passes that
//! already started, so a pass is never cut off halfway through its targets.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use linkmeta_core::models::{Frontmatter, MetadataSnapshot, ProcessReport, RuleSet};
use linkmeta_core::processor::{outgoing_targets, process_file, process_removed_links};
use linkmeta_core::store::DocumentStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    rule_set: RwLock<Arc<RuleSet>>,
    pending: DashMap<String, PendingTask>,
    /// Last seen outgoing link targets per source document.
    known_links: DashMap<String, Vec<String>>,
    /// Targets rewritten by a pass whose next modification event is ours.
    self_writes: DashMap<String, ()>,
    generation: AtomicU64,
    /// Held shared by every running pass. Set to `true` by shutdown.
    closed: tokio::sync::RwLock<bool>,
}

impl Inner {
    fn rule_set(&self) -> Arc<RuleSet> {
        let guard = self.rule_set.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }
}

/// Store wrapper that records self-writes as they happen.
struct MarkingStore<'a> {
    inner: &'a Inner,
}

#[async_trait]
impl<'a> DocumentStore for MarkingStore<'a> {
    async fn list_documents(&self) -> Result<Vec<String>> {
        self.inner.store.list_documents().await
    }

    async fn exists(&self, path: &str) -> bool {
        self.inner.store.exists(path).await
    }

    async fn read(&self, path: &str) -> Result<String> {
        self.inner.store.read(path).await
    }

    async fn metadata(&self, path: &str) -> Result<MetadataSnapshot> {
        self.inner.store.metadata(path).await
    }

    async fn resolve_link(&self, raw_link: &str, context_path: &str) -> Option<String> {
        self.inner.store.resolve_link(raw_link, context_path).await
    }

    async fn update_metadata(
        &self,
        path: &str,
        mutator: &mut (dyn for<'f> FnMut(&'f mut Frontmatter) + Send),
    ) -> Result<bool> {
        let self_writes = &self.inner.self_writes;
        // The store writes exactly when the mutator changed the frontmatter,
        // so the flag is set before the file changes on disk.
        let mut marking = |fm: &mut Frontmatter| {
            let before = fm.clone();
            mutator(fm);
            if *fm != before {
                self_writes.insert(path.to_string(), ());
            }
        };
        let result = self.inner.store.update_metadata(path, &mut marking).await;
        if result.is_err() {
            self_writes.remove(path);
        }
        result
    }
}

/// Cloneable handle to the shared scheduler state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn DocumentStore>, rule_set: RuleSet) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                rule_set: RwLock::new(Arc::new(rule_set)),
                pending: DashMap::new(),
                known_links: DashMap::new(),
                self_writes: DashMap::new(),
                generation: AtomicU64::new(0),
                closed: tokio::sync::RwLock::new(false),
            }),
        }
    }

    /// Replace the rules and options used by passes that start from now on.
    pub fn update_config(&self, rule_set: RuleSet) {
        let mut guard = self.inner.rule_set.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(rule_set);
    }

    pub fn rule_set(&self) -> Arc<RuleSet> {
        self.inner.rule_set()
    }

    /// Arm (or re-arm) the debounce timer for `path`.
    ///
    /// Returns `true` if an older pending task was superseded.
    pub fn schedule_processing(&self, path: &str) -> bool {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = Duration::from_millis(self.inner.rule_set().options.debounce_ms);

        // The entry guard is held across the spawn so the new task cannot
        // look for its entry before it exists.
        let entry = self.inner.pending.entry(path.to_string());

        let inner = Arc::clone(&self.inner);
        let key = path.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner
                .pending
                .remove_if(&key, |_, task| task.generation == generation)
                .is_none()
            {
                return;
            }
            let closed = inner.closed.read().await;
            if *closed {
                debug!(path = %key, "scheduler closed, pass skipped");
                return;
            }
            let report = run_pass(&inner, &key).await;
            drop(closed);
            info!(
                path = %key,
                links = report.links,
                fields_updated = report.fields_updated,
                errors = report.errors,
                "debounced pass finished"
            );
        });
        let task = PendingTask { generation, handle };

        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(task);
                previous.handle.abort();
                debug!(path = %path, "pending processing superseded");
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(task);
                debug!(path = %path, delay_ms = delay.as_millis() as u64, "processing scheduled");
                false
            }
        }
    }

    /// Cancel the pending task for `path`, if any.
    pub fn cancel_processing(&self, path: &str) -> bool {
        match self.inner.pending.remove(path) {
            Some((_, task)) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task. Returns how many were cancelled.
    pub fn cancel_all_processing(&self) -> usize {
        let keys: Vec<String> = self.inner.pending.iter().map(|e| e.key().clone()).collect();
        let cancelled = keys.iter().filter(|k| self.cancel_processing(k)).count();
        if cancelled > 0 {
            info!(cancelled, "cancelled pending processing");
        }
        cancelled
    }

    /// Cancel every pending task, then wait for passes already running to
    /// finish. Timers that fire afterwards do nothing. Returns how many
    /// pending tasks were cancelled.
    pub async fn shutdown(&self) -> usize {
        let cancelled = self.cancel_all_processing();
        let mut closed = self.inner.closed.write().await;
        *closed = true;
        info!(cancelled, "scheduler shut down");
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, path: &str) -> bool {
        self.inner.pending.contains_key(path)
    }

    /// Process `path` immediately, bypassing the debounce.
    pub async fn process_now(&self, path: &str) -> ProcessReport {
        self.cancel_processing(path);
        run_pass(&self.inner, path).await
    }

    /// Record the current outgoing targets of every document, so link
    /// removals are detected from the first edit on.
    pub async fn seed_known_links(&self) -> anyhow::Result<usize> {
        let store = self.inner.store.as_ref();
        let documents = store.list_documents().await?;
        for path in &documents {
            match outgoing_targets(store, path).await {
                Ok(targets) => {
                    self.inner.known_links.insert(path.clone(), targets);
                }
                Err(e) => debug!(path = %path, error = %format!("{:#}", e), "cannot index links"),
            }
        }
        Ok(documents.len())
    }

    pub fn known_targets(&self, path: &str) -> Option<Vec<String>> {
        self.inner.known_links.get(path).map(|targets| targets.value().clone())
    }

    /// A document was modified. Modifications caused by this scheduler's
    /// own writes are ignored once.
    pub fn on_modify(&self, path: &str) -> bool {
        if self.inner.self_writes.remove(path).is_some() {
            debug!(path = %path, "ignoring own write");
            return false;
        }
        self.schedule_processing(path);
        true
    }

    /// A document moved from `old` to `new`.
    pub fn on_rename(&self, old: &str, new: &str) {
        self.cancel_processing(old);
        self.inner.self_writes.remove(old);
        if let Some((_, targets)) = self.inner.known_links.remove(old) {
            self.inner.known_links.insert(new.to_string(), targets);
        }
        self.schedule_processing(new);
    }

    /// A document was deleted. With `update_on_delete`, its link reference
    /// is removed from every target it was last known to link to.
    pub async fn on_delete(&self, path: &str) -> ProcessReport {
        self.cancel_processing(path);
        self.inner.self_writes.remove(path);
        let known = self.inner.known_links.remove(path).map(|(_, targets)| targets);

        let rule_set = self.inner.rule_set();
        match known {
            Some(targets) if rule_set.options.update_on_delete && !targets.is_empty() => {
                let store = MarkingStore { inner: self.inner.as_ref() };
                process_removed_links(&store, path, &targets, &rule_set.rules).await
            }
            _ => ProcessReport::default(),
        }
    }
}

async fn run_pass(inner: &Inner, path: &str) -> ProcessReport {
    let rule_set = inner.rule_set();
    let marking = MarkingStore { inner };
    let store: &dyn DocumentStore = &marking;

    let mut report = match process_file(store, path, &rule_set.rules, &rule_set.options).await {
        Ok(report) => report,
        Err(e) => {
            warn!(path = %path, error = %format!("{:#}", e), "document processing failed");
            ProcessReport {
                documents: 1,
                errors: 1,
                ..Default::default()
            }
        }
    };

    if let Ok(current) = outgoing_targets(store, path).await {
        let previous = inner.known_links.insert(path.to_string(), current.clone());
        if rule_set.options.update_on_delete {
            let removed: Vec<String> = previous
                .unwrap_or_default()
                .into_iter()
                .filter(|t| !current.contains(t))
                .collect();
            if !removed.is_empty() {
                debug!(path = %path, removed = removed.len(), "links removed");
                report.absorb(process_removed_links(store, path, &removed, &rule_set.rules).await);
            }
        }
    }

    report
}
