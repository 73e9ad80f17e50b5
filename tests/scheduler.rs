use anyhow::Result;
use async_trait::async_trait;
use linkmeta::linkmeta_core::models::{
    Frontmatter, MetadataSnapshot, ProcessingOptions, Rule, RuleSet, ValueType,
};
use linkmeta::linkmeta_core::store::memory::InMemoryStore;
use linkmeta::linkmeta_core::store::DocumentStore;
use linkmeta::scheduler::Scheduler;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SOURCE: &str = "Daily Notes/2024-03-10.md";

fn rule(field: &str, value_type: ValueType) -> Rule {
    Rule {
        id: field.into(),
        name: field.into(),
        source_pattern: "Daily Notes/*".into(),
        target_tag: None,
        target_folder: Some("Movies".into()),
        update_field: field.into(),
        value_type,
        priority: 1,
        enabled: true,
        preserve_history: None,
    }
}

/// Store whose writes land immediately but take a while to return, the
/// way a file write does.
struct SlowWrites {
    inner: Arc<InMemoryStore>,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowWrites {
    async fn list_documents(&self) -> Result<Vec<String>> {
        self.inner.list_documents().await
    }

    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &str) -> Result<String> {
        self.inner.read(path).await
    }

    async fn metadata(&self, path: &str) -> Result<MetadataSnapshot> {
        self.inner.metadata(path).await
    }

    async fn resolve_link(&self, raw_link: &str, context_path: &str) -> Option<String> {
        self.inner.resolve_link(raw_link, context_path).await
    }

    async fn update_metadata(
        &self,
        path: &str,
        mutator: &mut (dyn for<'f> FnMut(&'f mut Frontmatter) + Send),
    ) -> Result<bool> {
        let changed = self.inner.update_metadata(path, mutator).await?;
        tokio::time::sleep(self.delay).await;
        Ok(changed)
    }
}

fn vault(update_on_delete: bool) -> (Arc<InMemoryStore>, RuleSet) {
    let store = Arc::new(InMemoryStore::new());
    store.insert(SOURCE, "Watched [[Alien]] and [[Heat]].\n");
    store.insert("Movies/Alien.md", "# Alien\n");
    store.insert("Movies/Heat.md", "# Heat\n");

    let rule_set = RuleSet {
        rules: vec![rule("seenIn", ValueType::AppendLink)],
        options: ProcessingOptions {
            update_on_delete,
            debounce_ms: 2000,
            ..Default::default()
        },
    };
    (store, rule_set)
}

fn setup(update_on_delete: bool) -> (Arc<InMemoryStore>, Scheduler) {
    let (store, rule_set) = vault(update_on_delete);
    let scheduler = Scheduler::new(store.clone(), rule_set);
    (store, scheduler)
}

/// Writes take 100 ms to return. A pass over `SOURCE` starts at 2000 ms,
/// writes Alien at once and Heat at 2100 ms, and ends around 2200 ms.
fn setup_slow_writes() -> (Arc<InMemoryStore>, Scheduler) {
    let (store, rule_set) = vault(false);
    let slow = Arc::new(SlowWrites {
        inner: store.clone(),
        delay: Duration::from_millis(100),
    });
    let scheduler = Scheduler::new(slow, rule_set);
    (store, scheduler)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(2500)).await;
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_runs_one_pass() {
    let (store, scheduler) = setup(false);

    assert!(!scheduler.schedule_processing(SOURCE));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(scheduler.schedule_processing(SOURCE));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(scheduler.schedule_processing(SOURCE));
    assert_eq!(scheduler.pending_count(), 1);

    settle().await;

    assert_eq!(scheduler.pending_count(), 0);
    // append_link is not idempotent, so a second pass would show up here.
    assert_eq!(
        store.frontmatter("Movies/Alien.md").unwrap()["seenIn"],
        json!(["[[2024-03-10]]"])
    );
}

#[tokio::test(start_paused = true)]
async fn nothing_fires_before_the_delay() {
    let (store, scheduler) = setup(false);

    scheduler.schedule_processing(SOURCE);
    tokio::time::sleep(Duration::from_millis(1999)).await;
    assert!(scheduler.is_pending(SOURCE));
    assert!(store.frontmatter("Movies/Alien.md").unwrap().is_empty());

    settle().await;
    assert!(!scheduler.is_pending(SOURCE));
    assert!(store.frontmatter("Movies/Alien.md").unwrap().contains_key("seenIn"));
}

#[tokio::test(start_paused = true)]
async fn cancel_all_prevents_firing() {
    let (store, scheduler) = setup(false);

    scheduler.schedule_processing(SOURCE);
    scheduler.schedule_processing("Movies/Alien.md");
    assert_eq!(scheduler.cancel_all_processing(), 2);
    assert_eq!(scheduler.pending_count(), 0);

    settle().await;
    assert!(store.frontmatter("Movies/Alien.md").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn own_writes_are_not_reprocessed() {
    let (_store, scheduler) = setup(false);

    scheduler.on_modify(SOURCE);
    settle().await;

    assert!(!scheduler.on_modify("Movies/Alien.md"));
    assert!(!scheduler.is_pending("Movies/Alien.md"));
    // Only the first event after our write is swallowed.
    assert!(scheduler.on_modify("Movies/Alien.md"));
    scheduler.cancel_all_processing();
}

#[tokio::test(start_paused = true)]
async fn write_seen_while_the_pass_is_running_is_ours() {
    let (_store, scheduler) = setup_slow_writes();

    scheduler.on_modify(SOURCE);
    tokio::time::sleep(Duration::from_millis(2050)).await;
    // Alien is already written; the pass is still waiting on that write.
    assert!(!scheduler.on_modify("Movies/Alien.md"));

    settle().await;
    // A later edit is the user's and must be processed.
    assert!(scheduler.on_modify("Movies/Alien.md"));
    scheduler.cancel_all_processing();
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_running_pass() {
    let (store, scheduler) = setup_slow_writes();

    scheduler.on_modify(SOURCE);
    tokio::time::sleep(Duration::from_millis(2050)).await;
    assert!(!store.frontmatter("Movies/Heat.md").unwrap().contains_key("seenIn"));

    assert_eq!(scheduler.shutdown().await, 0);
    assert_eq!(
        store.frontmatter("Movies/Heat.md").unwrap()["seenIn"],
        json!(["[[2024-03-10]]"])
    );

    // Timers armed after shutdown never run a pass.
    scheduler.schedule_processing(SOURCE);
    settle().await;
    assert_eq!(
        store.frontmatter("Movies/Alien.md").unwrap()["seenIn"],
        json!(["[[2024-03-10]]"])
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_timers() {
    let (store, scheduler) = setup(false);

    scheduler.schedule_processing(SOURCE);
    assert_eq!(scheduler.shutdown().await, 1);
    settle().await;
    assert!(store.frontmatter("Movies/Alien.md").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn removed_link_is_cleaned_up_when_enabled() {
    let (store, scheduler) = setup(true);

    scheduler.on_modify(SOURCE);
    settle().await;
    assert_eq!(
        scheduler.known_targets(SOURCE).unwrap(),
        vec!["Movies/Alien.md".to_string(), "Movies/Heat.md".to_string()]
    );

    store.insert(SOURCE, "Watched [[Alien]] only.\n");
    scheduler.on_modify(SOURCE);
    settle().await;

    assert!(!store.frontmatter("Movies/Heat.md").unwrap().contains_key("seenIn"));
    assert!(store.frontmatter("Movies/Alien.md").unwrap().contains_key("seenIn"));
}

#[tokio::test(start_paused = true)]
async fn removed_link_is_kept_when_disabled() {
    let (store, scheduler) = setup(false);

    scheduler.on_modify(SOURCE);
    settle().await;
    store.insert(SOURCE, "Watched [[Alien]] only.\n");
    scheduler.on_modify(SOURCE);
    settle().await;

    assert_eq!(
        store.frontmatter("Movies/Heat.md").unwrap()["seenIn"],
        json!(["[[2024-03-10]]"])
    );
}

#[tokio::test(start_paused = true)]
async fn delete_cleans_up_known_targets() {
    let (store, scheduler) = setup(true);
    scheduler.seed_known_links().await.unwrap();
    scheduler.process_now(SOURCE).await;

    store.remove(SOURCE);
    let report = scheduler.on_delete(SOURCE).await;

    assert_eq!(report.fields_updated, 2);
    assert!(store.frontmatter("Movies/Alien.md").unwrap().is_empty());
    assert!(scheduler.known_targets(SOURCE).is_none());
}

#[tokio::test(start_paused = true)]
async fn rename_moves_pending_work() {
    let (store, scheduler) = setup(false);
    scheduler.schedule_processing(SOURCE);

    store.remove(SOURCE);
    store.insert("Daily Notes/2024-03-11.md", "Watched [[Alien]].\n");
    scheduler.on_rename(SOURCE, "Daily Notes/2024-03-11.md");
    assert!(!scheduler.is_pending(SOURCE));
    assert!(scheduler.is_pending("Daily Notes/2024-03-11.md"));

    settle().await;
    assert_eq!(
        store.frontmatter("Movies/Alien.md").unwrap()["seenIn"],
        json!(["[[2024-03-11]]"])
    );
}

#[tokio::test(start_paused = true)]
async fn config_update_applies_to_later_passes() {
    let (store, scheduler) = setup(false);

    let mut rule_set = (*scheduler.rule_set()).clone();
    rule_set.rules[0].enabled = false;
    scheduler.update_config(rule_set);

    scheduler.schedule_processing(SOURCE);
    settle().await;
    assert!(store.frontmatter("Movies/Alien.md").unwrap().is_empty());
}
