//! Document, section, dependency, and suggestion persistence.
//!
//! The core consumes this through the [`DocumentRepository`] trait;
//! [`SqliteRepository`] is the shipped implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::database::Database;

/// Which side of the dependency graph to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    #[default]
    Both,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            "both" => Some(Direction::Both),
            _ => None,
        }
    }

    pub fn includes_incoming(self) -> bool {
        matches!(self, Direction::Incoming | Direction::Both)
    }

    pub fn includes_outgoing(self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub title: Option<String>,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub section_title: Option<String>,
    pub content: String,
    pub order: i64,
    pub embedding_id: Option<String>,
}

/// A section joined with its owning document.
#[derive(Debug, Clone)]
pub struct SectionWithDocument {
    pub section: SectionRecord,
    pub document: Option<DocumentRecord>,
}

/// A document joined with its sections, ordered by `order`.
#[derive(Debug, Clone)]
pub struct DocumentWithSections {
    pub document: DocumentRecord,
    pub sections: Vec<SectionRecord>,
}

/// One edge in the section dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependency_id: String,
    pub section_id: String,
    pub section_title: Option<String>,
    pub dependency_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyLists {
    pub incoming: Vec<DependencyEdge>,
    pub outgoing: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Edited,
}

impl SuggestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::Edited => "edited",
        }
    }
}

/// Input for persisting one edit suggestion.
#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub query_id: Uuid,
    pub section_id: Uuid,
    pub document_id: Option<Uuid>,
    pub original_text: String,
    pub suggested_text: String,
    pub reasoning: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub id: Uuid,
    pub query_id: Uuid,
    pub section_id: Uuid,
    pub document_id: Option<Uuid>,
    pub original_text: String,
    pub suggested_text: String,
    pub reasoning: String,
    pub confidence: f64,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

/// Repository surface the tool executor depends on.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn section_with_document(&self, id: Uuid) -> Result<Option<SectionWithDocument>>;
    async fn document_with_sections(&self, id: Uuid) -> Result<Option<DocumentWithSections>>;
    async fn create_suggestion(&self, suggestion: NewSuggestion) -> Result<SuggestionRecord>;
    async fn dependencies(&self, section_id: Uuid, direction: Direction)
        -> Result<DependencyLists>;
}

/// SQLite-backed repository.
#[derive(Clone)]
pub struct SqliteRepository {
    db: Database,
}

impl SqliteRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ── Write helpers (seeding, ingestion, maintenance) ────────────────

    pub fn create_document(&self, title: Option<&str>, file_path: &str) -> Result<DocumentRecord> {
        let id = Uuid::new_v4();
        self.db.conn().execute(
            "INSERT INTO documents (id, title, file_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), title, file_path, Utc::now().to_rfc3339()],
        )?;
        Ok(DocumentRecord {
            id,
            title: title.map(ToString::to_string),
            file_path: file_path.to_string(),
        })
    }

    pub fn create_section(
        &self,
        document_id: Uuid,
        section_title: Option<&str>,
        content: &str,
        order: i64,
    ) -> Result<SectionRecord> {
        let id = Uuid::new_v4();
        self.db.conn().execute(
            "INSERT INTO document_sections (id, document_id, section_title, content, section_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                document_id.to_string(),
                section_title,
                content,
                order
            ],
        )?;
        Ok(SectionRecord {
            id,
            document_id,
            section_title: section_title.map(ToString::to_string),
            content: content.to_string(),
            order,
            embedding_id: None,
        })
    }

    pub fn set_embedding_id(&self, section_id: Uuid, embedding_id: Option<&str>) -> Result<()> {
        self.db.conn().execute(
            "UPDATE document_sections SET embedding_id = ?2 WHERE id = ?1",
            params![section_id.to_string(), embedding_id],
        )?;
        Ok(())
    }

    /// All sections across all documents. Used by maintenance jobs.
    pub fn all_sections(&self) -> Result<Vec<SectionRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, section_title, content, section_order, embedding_id
             FROM document_sections",
        )?;
        let sections = stmt
            .query_map([], Self::map_section)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sections)
    }

    /// All documents with their ordered sections. Used by the dependency
    /// graph rebuild.
    pub fn all_documents_with_sections(&self) -> Result<Vec<DocumentWithSections>> {
        let documents = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare("SELECT id, title, file_path FROM documents")?;
            let documents = stmt
                .query_map([], Self::map_document)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            documents
        };

        documents
            .into_iter()
            .map(|document| {
                let sections = self.sections_of(document.id)?;
                Ok(DocumentWithSections { document, sections })
            })
            .collect()
    }

    pub fn clear_dependencies(&self) -> Result<usize> {
        let deleted = self
            .db
            .conn()
            .execute("DELETE FROM section_dependencies", [])?;
        Ok(deleted)
    }

    /// Insert a dependency edge, ignoring duplicates. Returns whether a
    /// new edge was created.
    pub fn insert_dependency(
        &self,
        source_section_id: Uuid,
        target_section_id: Uuid,
        dependency_type: &str,
    ) -> Result<bool> {
        let inserted = self.db.conn().execute(
            "INSERT OR IGNORE INTO section_dependencies
                 (id, source_section_id, target_section_id, dependency_type)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                source_section_id.to_string(),
                target_section_id.to_string(),
                dependency_type
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn suggestions_for_run(&self, query_id: Uuid) -> Result<Vec<SuggestionRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, query_id, section_id, document_id, original_text, suggested_text,
                    reasoning, confidence, status, created_at
             FROM edit_suggestions WHERE query_id = ?1 ORDER BY created_at ASC",
        )?;
        let suggestions = stmt
            .query_map([query_id.to_string()], Self::map_suggestion)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suggestions)
    }

    fn sections_of(&self, document_id: Uuid) -> Result<Vec<SectionRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, section_title, content, section_order, embedding_id
             FROM document_sections WHERE document_id = ?1 ORDER BY section_order ASC",
        )?;
        let sections = stmt
            .query_map([document_id.to_string()], Self::map_section)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sections)
    }

    fn edges(
        &self,
        section_id: Uuid,
        incoming: bool,
    ) -> Result<Vec<DependencyEdge>> {
        // Outgoing: edges where this section is the source, reported with
        // the target's identity. Incoming: the mirror image.
        let sql = if incoming {
            "SELECT d.id, d.source_section_id, s.section_title, d.dependency_type
             FROM section_dependencies d
             LEFT JOIN document_sections s ON s.id = d.source_section_id
             WHERE d.target_section_id = ?1"
        } else {
            "SELECT d.id, d.target_section_id, s.section_title, d.dependency_type
             FROM section_dependencies d
             LEFT JOIN document_sections s ON s.id = d.target_section_id
             WHERE d.source_section_id = ?1"
        };
        let conn = self.db.conn();
        let mut stmt = conn.prepare(sql)?;
        let edges = stmt
            .query_map([section_id.to_string()], |row| {
                Ok(DependencyEdge {
                    dependency_id: row.get(0)?,
                    section_id: row.get(1)?,
                    section_title: row.get(2)?,
                    dependency_type: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn map_document(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
        let id: String = row.get(0)?;
        Ok(DocumentRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            title: row.get(1)?,
            file_path: row.get(2)?,
        })
    }

    fn map_section(row: &Row<'_>) -> rusqlite::Result<SectionRecord> {
        let id: String = row.get(0)?;
        let document_id: String = row.get(1)?;
        Ok(SectionRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            document_id: Uuid::parse_str(&document_id).unwrap_or_default(),
            section_title: row.get(2)?,
            content: row.get(3)?,
            order: row.get(4)?,
            embedding_id: row.get(5)?,
        })
    }

    fn map_suggestion(row: &Row<'_>) -> rusqlite::Result<SuggestionRecord> {
        let id: String = row.get(0)?;
        let query_id: String = row.get(1)?;
        let section_id: String = row.get(2)?;
        let document_id: Option<String> = row.get(3)?;
        let status: String = row.get(8)?;
        let created_at: String = row.get(9)?;
        Ok(SuggestionRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            query_id: Uuid::parse_str(&query_id).unwrap_or_default(),
            section_id: Uuid::parse_str(&section_id).unwrap_or_default(),
            document_id: document_id.and_then(|d| Uuid::parse_str(&d).ok()),
            original_text: row.get(4)?,
            suggested_text: row.get(5)?,
            reasoning: row.get(6)?,
            confidence: row.get(7)?,
            status: match status.as_str() {
                "accepted" => SuggestionStatus::Accepted,
                "rejected" => SuggestionStatus::Rejected,
                "edited" => SuggestionStatus::Edited,
                _ => SuggestionStatus::Pending,
            },
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl DocumentRepository for SqliteRepository {
    async fn section_with_document(&self, id: Uuid) -> Result<Option<SectionWithDocument>> {
        let section = self
            .db
            .conn()
            .query_row(
                "SELECT id, document_id, section_title, content, section_order, embedding_id
                 FROM document_sections WHERE id = ?1",
                [id.to_string()],
                Self::map_section,
            )
            .optional()?;

        let Some(section) = section else {
            return Ok(None);
        };

        let document = self
            .db
            .conn()
            .query_row(
                "SELECT id, title, file_path FROM documents WHERE id = ?1",
                [section.document_id.to_string()],
                Self::map_document,
            )
            .optional()?;

        Ok(Some(SectionWithDocument { section, document }))
    }

    async fn document_with_sections(&self, id: Uuid) -> Result<Option<DocumentWithSections>> {
        let document = self
            .db
            .conn()
            .query_row(
                "SELECT id, title, file_path FROM documents WHERE id = ?1",
                [id.to_string()],
                Self::map_document,
            )
            .optional()?;

        let Some(document) = document else {
            return Ok(None);
        };

        let sections = self.sections_of(document.id)?;
        Ok(Some(DocumentWithSections { document, sections }))
    }

    async fn create_suggestion(&self, suggestion: NewSuggestion) -> Result<SuggestionRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.db.conn().execute(
            "INSERT INTO edit_suggestions
                 (id, query_id, document_id, section_id, original_text, suggested_text,
                  reasoning, confidence, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.to_string(),
                suggestion.query_id.to_string(),
                suggestion.document_id.map(|d| d.to_string()),
                suggestion.section_id.to_string(),
                suggestion.original_text,
                suggestion.suggested_text,
                suggestion.reasoning,
                suggestion.confidence,
                SuggestionStatus::Pending.as_str(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(SuggestionRecord {
            id,
            query_id: suggestion.query_id,
            section_id: suggestion.section_id,
            document_id: suggestion.document_id,
            original_text: suggestion.original_text,
            suggested_text: suggestion.suggested_text,
            reasoning: suggestion.reasoning,
            confidence: suggestion.confidence,
            status: SuggestionStatus::Pending,
            created_at: now,
        })
    }

    async fn dependencies(
        &self,
        section_id: Uuid,
        direction: Direction,
    ) -> Result<DependencyLists> {
        let mut lists = DependencyLists::default();
        if direction.includes_incoming() {
            lists.incoming = self.edges(section_id, true)?;
        }
        if direction.includes_outgoing() {
            lists.outgoing = self.edges(section_id, false)?;
        }
        Ok(lists)
    }
}
