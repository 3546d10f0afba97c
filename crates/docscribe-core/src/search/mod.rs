//! Semantic search abstraction.
//!
//! The tool executor only depends on [`SearchIndex`]; the backing index
//! (embedding store, vector database) is wired in by the host process.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One ranked match from the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub section_id: String,
    pub document_id: String,
    pub section_title: Option<String>,
    pub file_path: String,
    /// Full section content when the index stores it; callers preview it.
    pub content: Option<String>,
    pub score: f64,
}

/// Index health numbers for maintenance reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub initialized: bool,
}

/// Query surface of the semantic index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Rank sections against a natural-language query, optionally scoped
    /// to a file path.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        file_path_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// Look up sections whose document path matches a substring pattern.
    async fn search_by_path(&self, pattern: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    async fn stats(&self) -> Result<IndexStats>;
}
