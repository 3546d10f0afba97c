//! Cross-reference extraction and the dependency graph rebuild.
//!
//! Sections reference each other through markdown links, natural-language
//! mentions ("see the 'Authentication' section"), and dotted code
//! identifiers in backticks. Each resolved reference becomes a directed
//! edge in the `section_dependencies` table.

use std::collections::HashSet;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::storage::{DocumentWithSections, SectionRecord, SqliteRepository};

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());

static EXPLICIT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:see|refer to|check|read|described in|explained in)\s+(?:the\s+)?["']([^"']{3,})["'](?:\s+section)?"#,
    )
    .unwrap()
});

static CODE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)+)`").unwrap());

/// Identifiers too generic to count as references.
static COMMON_CODE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "id", "name", "type", "value", "data", "item", "user", "result", "error", "status",
        "code", "message", "text", "true", "false", "null", "none", "self", "this", "var",
        "let", "const",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Link,
    Anchor,
    Reference,
    Code,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Link => "link",
            ReferenceKind::Anchor => "anchor",
            ReferenceKind::Reference => "reference",
            ReferenceKind::Code => "code",
        }
    }
}

/// One potential cross-reference found in section content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub target: String,
    pub anchor: Option<String>,
}

/// Scan markdown content for cross-references.
///
/// External URLs are ignored; duplicates collapse to one reference.
pub fn extract_references(content: &str, current_file_path: &str) -> Vec<Reference> {
    let mut references = Vec::new();
    let mut seen = HashSet::new();

    for capture in MARKDOWN_LINK.captures_iter(content) {
        let url = &capture[2];
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("mailto:")
        {
            continue;
        }

        if let Some(anchor) = url.strip_prefix('#') {
            if seen.insert(format!("anchor:{anchor}")) {
                references.push(Reference {
                    kind: ReferenceKind::Anchor,
                    target: current_file_path.to_string(),
                    anchor: Some(anchor.to_string()),
                });
            }
            continue;
        }

        let (path, anchor) = match url.split_once('#') {
            Some((path, anchor)) => (path, Some(anchor.to_string())),
            None => (url, None),
        };
        let normalized = normalize_path(path, current_file_path);
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(format!("link:{normalized}:{anchor:?}")) {
            references.push(Reference {
                kind: ReferenceKind::Link,
                target: normalized,
                anchor,
            });
        }
    }

    for capture in EXPLICIT_REFERENCE.captures_iter(content) {
        let text = capture[1].trim().to_string();
        if text.len() < 3 || text.len() > 100 {
            continue;
        }
        if seen.insert(format!("reference:{text}")) {
            references.push(Reference {
                kind: ReferenceKind::Reference,
                target: text,
                anchor: None,
            });
        }
    }

    for capture in CODE_REFERENCE.captures_iter(content) {
        let identifier = capture[1].to_string();
        if COMMON_CODE_WORDS.contains(identifier.to_lowercase().as_str()) {
            continue;
        }
        if seen.insert(format!("code:{identifier}")) {
            references.push(Reference {
                kind: ReferenceKind::Code,
                target: identifier,
                anchor: None,
            });
        }
    }

    references
}

/// Resolve a link target against the containing document's path, folding
/// `.` and `..` segments and defaulting to a `.md` extension.
fn normalize_path(ref_path: &str, current_path: &str) -> String {
    let ref_path = ref_path.trim();
    if ref_path.is_empty() {
        return String::new();
    }

    let current_dir: Vec<&str> = match current_path.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };

    let mut segments: Vec<&str> = current_dir;
    for segment in ref_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut path = segments.join("/");
    if !path.ends_with(".md") {
        path.push_str(".md");
    }
    path
}

/// Outcome of a full dependency graph rebuild.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RebuildReport {
    pub sections_scanned: usize,
    pub dependencies_created: usize,
}

/// Drop and re-derive the whole dependency graph from section content.
pub fn rebuild_dependency_graph(repo: &SqliteRepository) -> Result<RebuildReport> {
    repo.clear_dependencies()?;

    let documents = repo.all_documents_with_sections()?;
    let resolver = Resolver::new(&documents);

    let mut sections_scanned = 0;
    let mut dependencies_created = 0;
    for doc in &documents {
        for section in &doc.sections {
            sections_scanned += 1;
            for reference in extract_references(&section.content, &doc.document.file_path) {
                let Some(target_id) = resolver.resolve(&reference, section.document_id) else {
                    continue;
                };
                if target_id == section.id {
                    continue;
                }
                if repo.insert_dependency(section.id, target_id, reference.kind.as_str())? {
                    dependencies_created += 1;
                }
            }
        }
    }

    tracing::info!(sections_scanned, dependencies_created, "rebuilt dependency graph");
    Ok(RebuildReport {
        sections_scanned,
        dependencies_created,
    })
}

/// In-memory lookup over all sections, applied in order of specificity:
/// path plus anchor, path alone, exact title, fuzzy title, content match.
struct Resolver<'a> {
    documents: &'a [DocumentWithSections],
}

impl<'a> Resolver<'a> {
    fn new(documents: &'a [DocumentWithSections]) -> Self {
        Self { documents }
    }

    fn resolve(&self, reference: &Reference, current_doc_id: Uuid) -> Option<Uuid> {
        let target = &reference.target;

        if let Some(anchor) = &reference.anchor {
            let anchor_lower = anchor.to_lowercase().replace('-', " ");
            if looks_like_path(target) {
                if let Some(section) = self
                    .sections_of_path(target)
                    .find(|s| title_matches(s, &anchor_lower))
                {
                    return Some(section.id);
                }
            }
            if let Some(section) = self
                .sections_of_doc(current_doc_id)
                .find(|s| title_matches(s, &anchor_lower))
            {
                return Some(section.id);
            }
        }

        if looks_like_path(target) {
            if let Some(section) = self.sections_of_path(target).next() {
                return Some(section.id);
            }
            // Fall back to a filename substring match.
            let filename = target
                .rsplit('/')
                .next()
                .unwrap_or(target)
                .trim_end_matches(".md");
            if !filename.is_empty() {
                if let Some(section) = self
                    .documents
                    .iter()
                    .filter(|d| d.document.file_path.contains(filename))
                    .flat_map(|d| d.sections.iter())
                    .next()
                {
                    return Some(section.id);
                }
            }
        }

        let target_lower = target.to_lowercase();
        if let Some(section) = self.all_sections().find(|s| {
            s.section_title
                .as_deref()
                .is_some_and(|t| t.to_lowercase() == target_lower)
        }) {
            return Some(section.id);
        }

        if target.len() >= 5 {
            if let Some(section) = self
                .all_sections()
                .find(|s| title_matches(s, &target_lower))
            {
                return Some(section.id);
            }
        }

        if target.contains('.') || target.contains('_') {
            if let Some(section) = self.all_sections().find(|s| s.content.contains(target)) {
                return Some(section.id);
            }
        }

        None
    }

    fn all_sections(&self) -> impl Iterator<Item = &SectionRecord> {
        self.documents.iter().flat_map(|d| d.sections.iter())
    }

    fn sections_of_doc(&self, doc_id: Uuid) -> impl Iterator<Item = &SectionRecord> {
        self.documents
            .iter()
            .filter(move |d| d.document.id == doc_id)
            .flat_map(|d| d.sections.iter())
    }

    fn sections_of_path<'b>(
        &'b self,
        path: &'b str,
    ) -> impl Iterator<Item = &'b SectionRecord> + 'b {
        self.documents
            .iter()
            .filter(move |d| {
                let file_path = d.document.file_path.as_str();
                file_path == path
                    || file_path.ends_with(path)
                    || file_path.ends_with(&format!("/{path}"))
            })
            .flat_map(|d| d.sections.iter())
    }
}

fn looks_like_path(target: &str) -> bool {
    target.ends_with(".md") || target.contains('/')
}

fn title_matches(section: &SectionRecord, needle_lower: &str) -> bool {
    section
        .section_title
        .as_deref()
        .is_some_and(|t| t.to_lowercase().contains(needle_lower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn markdown_links_skip_external_urls() {
        let refs = extract_references(
            "See [the guide](guide.md) and [the site](https://example.com).",
            "docs/intro.md",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::Link);
        assert_eq!(refs[0].target, "docs/guide.md");
    }

    #[test]
    fn same_page_anchors_point_at_the_current_file() {
        let refs = extract_references("Jump to [setup](#setup-steps).", "docs/intro.md");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::Anchor);
        assert_eq!(refs[0].target, "docs/intro.md");
        assert_eq!(refs[0].anchor.as_deref(), Some("setup-steps"));
    }

    #[test]
    fn explicit_references_are_extracted_case_insensitively() {
        let refs = extract_references(
            r#"SEE the "Authentication" section for details."#,
            "docs/intro.md",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::Reference);
        assert_eq!(refs[0].target, "Authentication");
    }

    #[test]
    fn code_references_require_a_dotted_identifier() {
        let refs = extract_references(
            "Call `client.sessions.create` but not `value` or `plain`.",
            "docs/api.md",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::Code);
        assert_eq!(refs[0].target, "client.sessions.create");
    }

    #[test]
    fn duplicate_references_collapse() {
        let refs = extract_references(
            "See [a](guide.md) and again [b](guide.md).",
            "docs/intro.md",
        );
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn relative_paths_fold_dot_segments() {
        assert_eq!(
            normalize_path("../other/file.md", "docs/guide/intro.md"),
            "docs/other/file.md"
        );
        assert_eq!(normalize_path("./page", "docs/intro.md"), "docs/page.md");
        assert_eq!(normalize_path("page.md", "intro.md"), "page.md");
    }

    #[test]
    fn rebuild_creates_edges_and_skips_self_references() {
        let repo = SqliteRepository::new(Database::open_in_memory().unwrap());

        let guide = repo.create_document(Some("Guide"), "docs/guide.md").unwrap();
        let auth = repo.create_document(Some("Auth"), "docs/auth.md").unwrap();
        let auth_section = repo
            .create_section(auth.id, Some("Authentication"), "Token details.", 0)
            .unwrap();
        // Links to auth.md, mentions its title, and links to itself.
        repo.create_section(
            guide.id,
            Some("Overview"),
            r#"Read [auth](auth.md). Also see the "Authentication" section. Self: [here](guide.md)."#,
            0,
        )
        .unwrap();

        let report = rebuild_dependency_graph(&repo).unwrap();
        assert_eq!(report.sections_scanned, 2);
        // Link and explicit reference both resolve to the auth section; the
        // self-link is dropped.
        assert_eq!(report.dependencies_created, 2);

        let rebuilt = rebuild_dependency_graph(&repo).unwrap();
        assert_eq!(rebuilt.dependencies_created, 2);
        let _ = auth_section;
    }
}
