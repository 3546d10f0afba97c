//! Tool outcomes as plain values.
//!
//! A failed tool call is data the model gets to see and recover from, not
//! an error that unwinds the run. Every variant serializes to the JSON
//! object fed back into the transcript.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::DependencyEdge;

/// One search match as reported to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub section_id: String,
    pub document_id: Option<String>,
    pub section_title: Option<String>,
    pub file_path: Option<String>,
    pub content_preview: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResultItem>,
    pub count: usize,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub section_id: String,
    pub section_title: Option<String>,
    pub content: String,
    pub file_path: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyOutcome {
    pub section_id: String,
    pub dependencies: Vec<DependencyEdge>,
}

/// A persisted edit suggestion. Also tracked on the agent state so the
/// final summary can count what was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeEditOutcome {
    pub success: bool,
    pub suggestion_id: String,
    pub document_id: Option<String>,
    pub section_id: String,
    pub section_title: Option<String>,
    pub file_path: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSection {
    pub section_id: String,
    pub title: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureOutcome {
    pub document_id: String,
    pub file_path: String,
    pub title: Option<String>,
    pub sections: Vec<StructureSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSearchOutcome {
    pub results: Vec<SearchResultItem>,
    pub count: usize,
    pub pattern: String,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Search(SearchOutcome),
    Section(SectionOutcome),
    Dependencies(DependencyOutcome),
    ProposeEdit(ProposeEditOutcome),
    Structure(StructureOutcome),
    PathSearch(PathSearchOutcome),
    Error { error: String },
}

impl ToolResult {
    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("failed to serialize tool result: {e}") })
        })
    }

    /// The string fed back into the transcript as the tool's reply.
    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}
