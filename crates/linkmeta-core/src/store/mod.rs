//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the narrow interface the engine needs from
//! its host: enumerate documents, read them, index their metadata, resolve
//! links, and apply an atomic read-modify-write to a document's frontmatter.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::frontmatter::parse_document;
use crate::links::{extract_headings, extract_inline_tags, extract_links};
use crate::models::{Frontmatter, MetadataSnapshot};

/// Abstract host document store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_documents`](DocumentStore::list_documents) | All document paths, sorted |
/// | [`exists`](DocumentStore::exists) | Whether a document exists |
/// | [`read`](DocumentStore::read) | Full document text |
/// | [`metadata`](DocumentStore::metadata) | Indexed metadata snapshot |
/// | [`resolve_link`](DocumentStore::resolve_link) | Raw link → document path |
/// | [`update_metadata`](DocumentStore::update_metadata) | Atomic frontmatter read-modify-write |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All document paths, vault-relative with `/` separators, sorted.
    async fn list_documents(&self) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> bool;

    async fn read(&self, path: &str) -> Result<String>;

    async fn metadata(&self, path: &str) -> Result<MetadataSnapshot>;

    /// Resolve a raw link found in `context_path` to a document path.
    async fn resolve_link(&self, raw_link: &str, context_path: &str) -> Option<String>;

    /// Apply `mutator` to the document's frontmatter as one atomic
    /// read-modify-write. The document is rewritten only if the frontmatter
    /// changed; returns whether it did.
    ///
    /// The mutator bound is written out as higher-ranked; `async_trait`
    /// would otherwise tie the frontmatter borrow to the method lifetime.
    async fn update_metadata(
        &self,
        path: &str,
        mutator: &mut (dyn for<'f> FnMut(&'f mut Frontmatter) + Send),
    ) -> Result<bool>;
}

/// Index a document's text into a [`MetadataSnapshot`].
pub fn snapshot_from_text(text: &str, created: Option<DateTime<Utc>>) -> Result<MetadataSnapshot> {
    let (frontmatter, body) = parse_document(text)?;
    Ok(MetadataSnapshot {
        frontmatter,
        tags: extract_inline_tags(body),
        headings: extract_headings(body),
        links: extract_links(body),
        created,
    })
}
