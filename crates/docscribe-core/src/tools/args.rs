//! Tool argument validation.
//!
//! Raw model output is untrusted JSON. Validation turns it into a typed
//! [`ToolArgs`] value or a [`ValidationError`] the executor reports back
//! to the model as a tool error, never as a crash.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::ToolName;
use crate::storage::Direction;

pub const MAX_QUERY_CHARS: usize = 5000;
pub const DEFAULT_N_RESULTS: usize = 10;
pub const MAX_N_RESULTS: usize = 20;
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Validation error: {0}")]
    Invalid(String),
}

/// A fully validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    SemanticSearch {
        query: String,
        n_results: usize,
        file_path_filter: Option<String>,
    },
    GetSectionContent {
        section_id: Uuid,
    },
    FindDependencies {
        section_id: Uuid,
        direction: Direction,
    },
    ProposeEdit {
        section_id: Uuid,
        suggested_text: String,
        reasoning: String,
        confidence: f64,
    },
    GetDocumentStructure {
        document_id: Uuid,
    },
    SearchByFilePath {
        path_pattern: String,
    },
}

#[derive(Deserialize)]
struct RawSemanticSearch {
    query: String,
    n_results: Option<i64>,
    file_path_filter: Option<String>,
}

#[derive(Deserialize)]
struct RawSectionId {
    section_id: String,
}

#[derive(Deserialize)]
struct RawFindDependencies {
    section_id: String,
    direction: Option<String>,
}

#[derive(Deserialize)]
struct RawProposeEdit {
    section_id: String,
    suggested_text: String,
    reasoning: String,
    confidence: Option<f64>,
}

#[derive(Deserialize)]
struct RawDocumentId {
    document_id: String,
}

#[derive(Deserialize)]
struct RawPathPattern {
    path_pattern: String,
}

impl ToolArgs {
    /// Validate raw model-provided arguments for the named tool.
    pub fn validate(tool_name: &str, raw: &Value) -> Result<Self, ValidationError> {
        let tool = ToolName::parse(tool_name)
            .ok_or_else(|| ValidationError::UnknownTool(tool_name.to_string()))?;

        match tool {
            ToolName::SemanticSearch => {
                let args: RawSemanticSearch = parse(raw)?;
                let query = args.query.trim().to_string();
                if query.is_empty() {
                    return Err(ValidationError::Invalid("query must not be empty".into()));
                }
                if query.chars().count() > MAX_QUERY_CHARS {
                    return Err(ValidationError::Invalid(format!(
                        "query exceeds {MAX_QUERY_CHARS} characters"
                    )));
                }
                // Out-of-range counts are clamped, not rejected.
                let n_results = args
                    .n_results
                    .map_or(DEFAULT_N_RESULTS, |n| n.clamp(1, MAX_N_RESULTS as i64) as usize);
                Ok(ToolArgs::SemanticSearch {
                    query,
                    n_results,
                    file_path_filter: args.file_path_filter,
                })
            }
            ToolName::GetSectionContent => {
                let args: RawSectionId = parse(raw)?;
                Ok(ToolArgs::GetSectionContent {
                    section_id: parse_uuid("section_id", &args.section_id)?,
                })
            }
            ToolName::FindDependencies => {
                let args: RawFindDependencies = parse(raw)?;
                let direction = match args.direction.as_deref() {
                    None => Direction::Both,
                    Some(raw) => Direction::parse(raw).ok_or_else(|| {
                        ValidationError::Invalid(format!("invalid direction '{raw}'"))
                    })?,
                };
                Ok(ToolArgs::FindDependencies {
                    section_id: parse_uuid("section_id", &args.section_id)?,
                    direction,
                })
            }
            ToolName::ProposeEdit => {
                let args: RawProposeEdit = parse(raw)?;
                if args.suggested_text.is_empty() {
                    return Err(ValidationError::Invalid(
                        "suggested_text must not be empty".into(),
                    ));
                }
                if args.reasoning.is_empty() {
                    return Err(ValidationError::Invalid(
                        "reasoning must not be empty".into(),
                    ));
                }
                Ok(ToolArgs::ProposeEdit {
                    section_id: parse_uuid("section_id", &args.section_id)?,
                    suggested_text: args.suggested_text,
                    reasoning: args.reasoning,
                    confidence: args.confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
                })
            }
            ToolName::GetDocumentStructure => {
                let args: RawDocumentId = parse(raw)?;
                Ok(ToolArgs::GetDocumentStructure {
                    document_id: parse_uuid("document_id", &args.document_id)?,
                })
            }
            ToolName::SearchByFilePath => {
                let args: RawPathPattern = parse(raw)?;
                if args.path_pattern.trim().is_empty() {
                    return Err(ValidationError::Invalid(
                        "path_pattern must not be empty".into(),
                    ));
                }
                Ok(ToolArgs::SearchByFilePath {
                    path_pattern: args.path_pattern,
                })
            }
        }
    }
}

fn parse<'a, T: Deserialize<'a>>(raw: &'a Value) -> Result<T, ValidationError> {
    T::deserialize(raw).map_err(|e| ValidationError::Invalid(e.to_string()))
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw)
        .map_err(|_| ValidationError::Invalid(format!("{field} is not a valid UUID: '{raw}'")))
}
