//! Tool dispatch.
//!
//! Validates raw arguments, runs the matching handler against storage and
//! search, updates agent state, and emits progress events. Failures of any
//! kind come back as an error-valued [`ToolResult`]; the loop never unwinds
//! because the model asked for something bad.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use uuid::Uuid;

use super::args::ToolArgs;
use super::result::{
    DependencyOutcome, PathSearchOutcome, ProposeEditOutcome, SearchOutcome, SearchResultItem,
    SectionOutcome, StructureOutcome, StructureSection, ToolResult,
};
use crate::agent::AgentState;
use crate::events::EventEmitter;
use crate::search::{SearchHit, SearchIndex};
use crate::storage::{Direction, DocumentRepository, NewSuggestion};

/// Characters of content included in previews.
pub const PREVIEW_CHARS: usize = 200;
/// Result cap for path-based lookups.
pub const PATH_SEARCH_LIMIT: usize = 20;

pub struct ToolExecutor {
    repo: Arc<dyn DocumentRepository>,
    search: Arc<dyn SearchIndex>,
    emitter: EventEmitter,
}

impl ToolExecutor {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        search: Arc<dyn SearchIndex>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            repo,
            search,
            emitter,
        }
    }

    /// Run one tool call. Validation happens before any state or storage
    /// is touched, so a rejected call leaves the run exactly as it was.
    pub async fn execute(
        &self,
        state: &mut AgentState,
        tool_name: &str,
        raw_args: &Value,
    ) -> ToolResult {
        tracing::info!(tool = tool_name, "executing tool");
        tracing::debug!(tool = tool_name, args = %raw_args, "tool arguments");

        let args = match ToolArgs::validate(tool_name, raw_args) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = tool_name, "rejected tool call: {e}");
                return ToolResult::error(e.to_string());
            }
        };

        let outcome = match args {
            ToolArgs::SemanticSearch {
                query,
                n_results,
                file_path_filter,
            } => {
                self.semantic_search(state, query, n_results, file_path_filter)
                    .await
            }
            ToolArgs::GetSectionContent { section_id } => {
                self.get_section_content(state, section_id).await
            }
            ToolArgs::FindDependencies {
                section_id,
                direction,
            } => self.find_dependencies(section_id, direction).await,
            ToolArgs::ProposeEdit {
                section_id,
                suggested_text,
                reasoning,
                confidence,
            } => {
                self.propose_edit(state, section_id, suggested_text, reasoning, confidence)
                    .await
            }
            ToolArgs::GetDocumentStructure { document_id } => {
                self.get_document_structure(document_id).await
            }
            ToolArgs::SearchByFilePath { path_pattern } => {
                self.search_by_file_path(path_pattern).await
            }
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(tool = tool_name, "tool failed: {e:#}");
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn semantic_search(
        &self,
        state: &mut AgentState,
        query: String,
        n_results: usize,
        file_path_filter: Option<String>,
    ) -> Result<ToolResult> {
        // Recorded even if the backend errors; the attempt happened.
        state.searched_queries.push(query.clone());

        let hits = self
            .search
            .search(&query, n_results, file_path_filter.as_deref())
            .await?;
        let results: Vec<SearchResultItem> = hits.iter().map(hit_to_item).collect();
        let count = results.len();

        self.emitter
            .search_complete(
                count,
                &format!("Found {count} relevant sections"),
                "semantic_search",
            )
            .await;

        Ok(ToolResult::Search(SearchOutcome {
            results,
            count,
            query,
        }))
    }

    async fn get_section_content(
        &self,
        state: &mut AgentState,
        section_id: Uuid,
    ) -> Result<ToolResult> {
        let Some(found) = self.repo.section_with_document(section_id).await? else {
            return Ok(ToolResult::error(format!("Section {section_id} not found")));
        };

        state.analyzed_sections.insert(section_id.to_string());

        Ok(ToolResult::Section(SectionOutcome {
            section_id: section_id.to_string(),
            section_title: found.section.section_title,
            content: found.section.content,
            file_path: found.document.map(|d| d.file_path),
            order: found.section.order,
        }))
    }

    async fn find_dependencies(
        &self,
        section_id: Uuid,
        direction: Direction,
    ) -> Result<ToolResult> {
        let lists = self.repo.dependencies(section_id, direction).await?;
        let mut dependencies = lists.incoming;
        dependencies.extend(lists.outgoing);

        Ok(ToolResult::Dependencies(DependencyOutcome {
            section_id: section_id.to_string(),
            dependencies,
        }))
    }

    async fn propose_edit(
        &self,
        state: &mut AgentState,
        section_id: Uuid,
        suggested_text: String,
        reasoning: String,
        confidence: f64,
    ) -> Result<ToolResult> {
        let Some(found) = self.repo.section_with_document(section_id).await? else {
            return Ok(ToolResult::error(format!("Section {section_id} not found")));
        };

        // The stored content is the authoritative "before" text.
        let suggestion = self
            .repo
            .create_suggestion(NewSuggestion {
                query_id: state.run_id,
                section_id,
                document_id: Some(found.section.document_id),
                original_text: found.section.content,
                suggested_text: suggested_text.clone(),
                reasoning,
                confidence,
            })
            .await?;

        let file_path = found.document.map(|d| d.file_path);
        let outcome = ProposeEditOutcome {
            success: true,
            suggestion_id: suggestion.id.to_string(),
            document_id: suggestion.document_id.map(|d| d.to_string()),
            section_id: section_id.to_string(),
            section_title: found.section.section_title,
            file_path,
            confidence,
        };
        state.proposed_edits.push(outcome.clone());

        self.emitter
            .suggestion(
                &outcome.suggestion_id,
                outcome.document_id.as_deref().unwrap_or(""),
                outcome.section_title.as_deref(),
                outcome.file_path.as_deref().unwrap_or(""),
                confidence,
                &preview(&suggested_text),
            )
            .await;

        Ok(ToolResult::ProposeEdit(outcome))
    }

    async fn get_document_structure(&self, document_id: Uuid) -> Result<ToolResult> {
        let Some(found) = self.repo.document_with_sections(document_id).await? else {
            return Ok(ToolResult::error(format!(
                "Document {document_id} not found"
            )));
        };

        let sections = found
            .sections
            .into_iter()
            .map(|s| StructureSection {
                section_id: s.id.to_string(),
                title: s.section_title,
                order: s.order,
            })
            .collect();

        Ok(ToolResult::Structure(StructureOutcome {
            document_id: document_id.to_string(),
            file_path: found.document.file_path,
            title: found.document.title,
            sections,
        }))
    }

    async fn search_by_file_path(&self, path_pattern: String) -> Result<ToolResult> {
        let hits = self
            .search
            .search_by_path(&path_pattern, PATH_SEARCH_LIMIT)
            .await?;
        let results: Vec<SearchResultItem> = hits.iter().map(hit_to_item).collect();
        let count = results.len();

        Ok(ToolResult::PathSearch(PathSearchOutcome {
            results,
            count,
            pattern: path_pattern,
        }))
    }
}

fn hit_to_item(hit: &SearchHit) -> SearchResultItem {
    SearchResultItem {
        section_id: hit.section_id.clone(),
        document_id: Some(hit.document_id.clone()),
        section_title: hit.section_title.clone(),
        file_path: Some(hit.file_path.clone()),
        content_preview: hit.content.as_deref().map(preview),
        score: hit.score,
    }
}

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect()
}
