//! Persistence layer.
//!
//! SQLite-based storage for:
//! - Run records and their status state machine
//! - Documents, sections, and the section dependency graph
//! - Persisted edit suggestions
//! - The durable event log (see `events::durable`)

mod database;
mod documents;
mod runs;

pub use database::Database;
pub use documents::{
    DependencyEdge, DependencyLists, Direction, DocumentRecord, DocumentRepository,
    DocumentWithSections, NewSuggestion, SectionRecord, SectionWithDocument, SqliteRepository,
    SuggestionRecord, SuggestionStatus,
};
pub use runs::{RunRecord, RunStatus, RunStore};
