//! In-memory [`DocumentStore`] implementation for testing and embedding.
//!
//! Documents live in a `BTreeMap` behind `std::sync::RwLock`. The write lock
//! is held for the whole read-modify-write, so `update_metadata` is atomic.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::frontmatter::{parse_document, render_document};
use crate::links::resolve_link_path;
use crate::models::{Frontmatter, MetadataSnapshot};

use super::{snapshot_from_text, DocumentStore};

struct StoredDoc {
    text: String,
    created: Option<DateTime<Utc>>,
}

/// In-memory store keyed by vault-relative path.
pub struct InMemoryStore {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert or replace a document.
    pub fn insert(&self, path: &str, text: &str) {
        self.insert_with_created(path, text, None);
    }

    pub fn insert_with_created(&self, path: &str, text: &str, created: Option<DateTime<Utc>>) {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        docs.insert(
            path.to_string(),
            StoredDoc {
                text: text.to_string(),
                created,
            },
        );
    }

    pub fn remove(&self, path: &str) -> bool {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        docs.remove(path).is_some()
    }

    /// Current text of a document.
    pub fn text(&self, path: &str) -> Option<String> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        docs.get(path).map(|d| d.text.clone())
    }

    /// Current frontmatter of a document, if it exists and parses.
    pub fn frontmatter(&self, path: &str) -> Option<Frontmatter> {
        let text = self.text(path)?;
        parse_document(&text).ok().map(|(fm, _)| fm)
    }

    fn paths(&self) -> Vec<String> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        docs.keys().cloned().collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_documents(&self) -> Result<Vec<String>> {
        Ok(self.paths())
    }

    async fn exists(&self, path: &str) -> bool {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        docs.contains_key(path)
    }

    async fn read(&self, path: &str) -> Result<String> {
        self.text(path)
            .ok_or_else(|| anyhow!("Document not found: {}", path))
    }

    async fn metadata(&self, path: &str) -> Result<MetadataSnapshot> {
        let (text, created) = {
            let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
            let doc = docs
                .get(path)
                .ok_or_else(|| anyhow!("Document not found: {}", path))?;
            (doc.text.clone(), doc.created)
        };
        snapshot_from_text(&text, created)
    }

    async fn resolve_link(&self, raw_link: &str, context_path: &str) -> Option<String> {
        resolve_link_path(raw_link, context_path, &self.paths())
    }

    async fn update_metadata(
        &self,
        path: &str,
        mutator: &mut (dyn for<'f> FnMut(&'f mut Frontmatter) + Send),
    ) -> Result<bool> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let doc = docs
            .get_mut(path)
            .ok_or_else(|| anyhow!("Document not found: {}", path))?;

        let (mut frontmatter, body) = parse_document(&doc.text)?;
        let original = frontmatter.clone();
        mutator(&mut frontmatter);
        if frontmatter == original {
            return Ok(false);
        }

        doc.text = render_document(&frontmatter, body)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn update_writes_only_on_change() {
        let store = InMemoryStore::new();
        store.insert("a.md", "plain body\n");

        let changed = store.update_metadata("a.md", &mut |_fm: &mut Frontmatter| {}).await.unwrap();
        assert!(!changed);
        assert_eq!(store.text("a.md").unwrap(), "plain body\n");

        let changed = store
            .update_metadata("a.md", &mut |fm: &mut Frontmatter| {
                fm.insert("seen".into(), json!(true));
            })
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(store.text("a.md").unwrap(), "---\nseen: true\n---\nplain body\n");
    }

    #[tokio::test]
    async fn mutator_can_borrow_caller_state_through_dyn_store() {
        let store = InMemoryStore::new();
        store.insert("a.md", "---\ncount: 1\n---\n");
        let dyn_store: &dyn DocumentStore = &store;

        let mut seen = None;
        let changed = dyn_store
            .update_metadata("a.md", &mut |fm: &mut Frontmatter| {
                seen = fm.get("count").cloned();
                fm.insert("count".into(), json!(2));
            })
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(seen, Some(json!(1)));
        assert_eq!(store.frontmatter("a.md").unwrap()["count"], json!(2));
    }

    #[tokio::test]
    async fn missing_documents_are_errors() {
        let store = InMemoryStore::new();
        assert!(store.metadata("nope.md").await.is_err());
        assert!(store.update_metadata("nope.md", &mut |_: &mut Frontmatter| {}).await.is_err());
        assert!(!store.exists("nope.md").await);
    }

    #[tokio::test]
    async fn resolves_links_against_stored_paths() {
        let store = InMemoryStore::new();
        store.insert("Movies/Alien.md", "");
        assert_eq!(
            store.resolve_link("Alien", "Daily/x.md").await.as_deref(),
            Some("Movies/Alien.md")
        );
    }
}
