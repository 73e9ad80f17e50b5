//! Filesystem-backed [`DocumentStore`].
//!
//! Documents are the files under `vault.root` that match `include_globs`
//! and none of `exclude_globs`. Paths are vault-relative with `/`
//! separators. Version-control, editor and trash folders are always
//! excluded.
//!
//! Link resolution runs against the document list of the last scan. A scan
//! happens on `list_documents`, on every watcher tick, and on the first
//! resolution if nothing has scanned yet.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use linkmeta_core::frontmatter::{parse_document, render_document};
use linkmeta_core::links::resolve_link_path;
use linkmeta_core::models::{Frontmatter, MetadataSnapshot};
use linkmeta_core::store::{snapshot_from_text, DocumentStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::VaultConfig;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/.obsidian/**", "**/.trash/**"];

/// Size and modification time of a document, as seen by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: SystemTime,
}

pub struct VaultStore {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    write_lock: Mutex<()>,
    /// Document paths from the most recent scan.
    documents: RwLock<Option<Arc<Vec<String>>>>,
    scans: AtomicUsize,
}

impl VaultStore {
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let root = config.root.clone();
        if !root.is_dir() {
            bail!("Vault root does not exist: {}", root.display());
        }

        let include = build_globset(&config.include_globs)?;
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.clone());
        let exclude = build_globset(&excludes)?;

        Ok(Self {
            root,
            include,
            exclude,
            follow_symlinks: config.follow_symlinks,
            write_lock: Mutex::new(()),
            documents: RwLock::new(None),
            scans: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a vault-relative document path.
    pub fn absolute(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Walk the vault and stamp every document. Entries that cannot be read
    /// are skipped. Refreshes the document list used to resolve links.
    pub fn scan(&self) -> Result<BTreeMap<String, FileStamp>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let mut stamps = BTreeMap::new();

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable vault entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(rel) = self.relative(path) else {
                continue;
            };

            // Leading `/` lets `**/.git/**` match top-level folders too.
            let rooted = format!("/{}", rel);
            if self.exclude.is_match(&rel) || self.exclude.is_match(&rooted) {
                continue;
            }
            if !self.include.is_match(&rel) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(path = %rel, error = %e, "skipping unreadable document");
                    continue;
                }
            };
            stamps.insert(
                rel,
                FileStamp {
                    len: metadata.len(),
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                },
            );
        }

        let documents: Vec<String> = stamps.keys().cloned().collect();
        *self.documents.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(documents));
        Ok(stamps)
    }

    /// Document paths from the last scan, scanning first if there was none.
    fn documents(&self) -> Result<Arc<Vec<String>>> {
        if let Some(documents) = self.documents.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Ok(Arc::clone(documents));
        }
        self.scan()?;
        let cached = self.documents.read().unwrap_or_else(|e| e.into_inner());
        Ok(cached.as_ref().map(Arc::clone).unwrap_or_default())
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    async fn created_time(&self, path: &str) -> Option<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(self.absolute(path)).await.ok()?;
        let time = metadata.created().or_else(|_| metadata.modified()).ok()?;
        Some(DateTime::<Utc>::from(time))
    }
}

#[async_trait]
impl DocumentStore for VaultStore {
    async fn list_documents(&self) -> Result<Vec<String>> {
        Ok(self.scan()?.into_keys().collect())
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.absolute(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read(&self, path: &str) -> Result<String> {
        tokio::fs::read_to_string(self.absolute(path))
            .await
            .with_context(|| format!("Failed to read document: {}", path))
    }

    async fn metadata(&self, path: &str) -> Result<MetadataSnapshot> {
        let text = self.read(path).await?;
        let created = self.created_time(path).await;
        snapshot_from_text(&text, created).with_context(|| format!("Invalid frontmatter in {}", path))
    }

    async fn resolve_link(&self, raw_link: &str, context_path: &str) -> Option<String> {
        let documents = self.documents().ok()?;
        resolve_link_path(raw_link, context_path, &documents)
    }

    async fn update_metadata(
        &self,
        path: &str,
        mutator: &mut (dyn for<'f> FnMut(&'f mut Frontmatter) + Send),
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let text = self.read(path).await?;
        let (mut frontmatter, body) =
            parse_document(&text).with_context(|| format!("Invalid frontmatter in {}", path))?;
        let original = frontmatter.clone();
        mutator(&mut frontmatter);
        if frontmatter == original {
            return Ok(false);
        }

        let rendered = render_document(&frontmatter, body)?;
        tokio::fs::write(self.absolute(path), rendered)
            .await
            .with_context(|| format!("Failed to write document: {}", path))?;
        debug!(path = %path, "frontmatter written");
        Ok(true)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| anyhow!("Invalid glob '{}': {}", pattern, e))?);
    }
    Ok(builder.build()?)
}
