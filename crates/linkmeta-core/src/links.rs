//! Link, tag, and heading extraction from markdown, plus link resolution.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::Heading;

// Compile regex once, reuse across calls
static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[\[([^\]]+)\]\]").unwrap());

static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\(\s*<?([^)>]+?)>?\s*\)").unwrap());

static FENCED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n.*?```|~~~[^\n]*\n.*?~~~").unwrap());

static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`\n]*`").unwrap());

static INLINE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(,])#([\p{L}\p{N}_/\-]+)").unwrap());

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+?)[ \t#]*$").unwrap());

fn strip_code(markdown: &str) -> String {
    let without_fenced = FENCED_CODE_RE.replace_all(markdown, "");
    INLINE_CODE_RE.replace_all(&without_fenced, "").into_owned()
}

/// Page name of a wikilink body: alias and anchor stripped.
fn wikilink_page(content: &str) -> Option<String> {
    let before_alias = content.split('|').next().unwrap_or(content);
    let page = before_alias.split('#').next().unwrap_or(before_alias).trim();
    if page.is_empty() {
        None
    } else {
        Some(page.to_string())
    }
}

/// Target of a markdown link if it points at a local document.
fn markdown_link_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.contains("://") || raw.starts_with("mailto:")
    {
        return None;
    }
    let without_anchor = raw.split('#').next().unwrap_or(raw);
    let decoded = urlencoding::decode(without_anchor)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| without_anchor.to_string());
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extract outgoing link targets from markdown text, in document order.
///
/// Both `[[Page#Anchor|Alias]]` wikilinks (embeds included) and
/// `[text](path.md)` links are returned as raw, unresolved page names.
/// Links inside fenced or inline code are ignored. Duplicates are kept.
pub fn extract_links(markdown: &str) -> Vec<String> {
    let text = strip_code(markdown);
    let mut found: Vec<(usize, String)> = Vec::new();

    for cap in WIKILINK_RE.captures_iter(&text) {
        if let Some(page) = wikilink_page(&cap[1]) {
            found.push((cap.get(0).map_or(0, |m| m.start()), page));
        }
    }
    for cap in MARKDOWN_LINK_RE.captures_iter(&text) {
        if let Some(target) = markdown_link_target(&cap[1]) {
            found.push((cap.get(0).map_or(0, |m| m.start()), target));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, link)| link).collect()
}

/// Inline `#tag` annotations outside code, `#`-prefixed, deduplicated.
/// Purely numeric tags (`#2024`) are not tags.
pub fn extract_inline_tags(body: &str) -> Vec<String> {
    let text = strip_code(body);
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for cap in INLINE_TAG_RE.captures_iter(&text) {
        let tag = &cap[1];
        if tag.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let tagged = format!("#{}", tag);
        if seen.insert(tagged.clone()) {
            tags.push(tagged);
        }
    }
    tags
}

/// ATX headings outside fenced code.
pub fn extract_headings(body: &str) -> Vec<Heading> {
    let text = FENCED_CODE_RE.replace_all(body, "");
    HEADING_RE
        .captures_iter(&text)
        .map(|cap| Heading {
            level: cap[1].len(),
            text: cap[2].trim().to_string(),
        })
        .collect()
}

/// File name without directory or `.md` extension.
pub fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

/// The link reference written into target metadata for `path`.
///
/// Example: `link_to("Daily Notes/2024-03-10.md")` → `"[[2024-03-10]]"`
pub fn link_to(path: &str) -> String {
    format!("[[{}]]", file_stem(path))
}

/// Resolve a page name relative to the folder containing `context_path`.
/// Returns a vault-relative path with `.md` extension.
///
/// Example: `resolve_relative("Notes/Source.md", "../Ideas")` → `"Ideas.md"`
pub fn resolve_relative(context_path: &str, page: &str) -> String {
    let dir = match context_path.rfind('/') {
        Some(idx) => &context_path[..idx],
        None => "",
    };
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();

    for part in page.split('/') {
        if part == ".." {
            segments.pop();
        } else if part != "." && !part.is_empty() {
            segments.push(part);
        }
    }

    with_md(&segments.join("/"))
}

fn with_md(path: &str) -> String {
    if path.to_lowercase().ends_with(".md") {
        path.to_string()
    } else {
        format!("{}.md", path)
    }
}

/// Resolve a raw link against the known document paths.
///
/// Resolution order: explicit relative (`./`, `../`), path from the vault
/// root, path from the linking document's folder, then the shortest path
/// whose tail matches the link. Comparisons are case-insensitive.
pub fn resolve_link_path(raw: &str, context_path: &str, documents: &[String]) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let find = |candidate: &str| -> Option<String> {
        let lower = candidate.to_lowercase();
        documents.iter().find(|d| d.to_lowercase() == lower).cloned()
    };

    if raw.starts_with("./") || raw.starts_with("../") {
        return find(&resolve_relative(context_path, raw));
    }

    let rooted = with_md(raw.trim_start_matches('/'));
    if let Some(found) = find(&rooted) {
        return Some(found);
    }

    if let Some(found) = find(&resolve_relative(context_path, &rooted)) {
        return Some(found);
    }

    let tail = format!("/{}", rooted.to_lowercase());
    documents
        .iter()
        .filter(|d| d.to_lowercase().ends_with(&tail))
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .cloned()
}
