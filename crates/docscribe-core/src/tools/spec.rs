//! Tool schemas handed to the completion model.

use serde::Serialize;
use serde_json::{json, Value};

/// One tool definition in function-calling format.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// The full tool catalog, in the order the model sees it.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "semantic_search",
            description: "Search documentation for sections semantically related to a query. \
                          Use this to find sections that might need updating based on the \
                          user's change description.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query describing what to look for"
                    },
                    "n_results": {
                        "type": "integer",
                        "description": "Number of results to return (default: 10, max: 20)",
                        "default": 10
                    },
                    "file_path_filter": {
                        "type": "string",
                        "description": "Optional: filter results to a specific file path pattern"
                    }
                },
                "required": ["query"]
            }),
        },
        ToolSpec {
            name: "get_section_content",
            description: "Get the full content of a specific documentation section by its ID. \
                          Use this after semantic search to get complete context.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "section_id": {
                        "type": "string",
                        "description": "The UUID of the section to retrieve"
                    }
                },
                "required": ["section_id"]
            }),
        },
        ToolSpec {
            name: "find_dependencies",
            description: "Find sections that reference or depend on a given section. Use this \
                          to identify sections that might also need updates due to dependencies.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "section_id": {
                        "type": "string",
                        "description": "The UUID of the section to find dependencies for"
                    },
                    "direction": {
                        "type": "string",
                        "enum": ["incoming", "outgoing", "both"],
                        "description": "Direction of dependencies: 'incoming' (sections that \
                                        reference this one), 'outgoing' (sections this one \
                                        references), or 'both'",
                        "default": "both"
                    }
                },
                "required": ["section_id"]
            }),
        },
        ToolSpec {
            name: "propose_edit",
            description: "Propose an edit to a documentation section. Call this when you've \
                          identified a section that needs updating.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "section_id": {
                        "type": "string",
                        "description": "The UUID of the section to edit"
                    },
                    "suggested_text": {
                        "type": "string",
                        "description": "The proposed new content for this section"
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "Explanation of why this edit is needed and what changed"
                    },
                    "confidence": {
                        "type": "number",
                        "description": "Confidence score from 0.0 to 1.0 indicating how certain \
                                        you are this edit is correct",
                        "minimum": 0,
                        "maximum": 1
                    }
                },
                "required": ["section_id", "suggested_text", "reasoning", "confidence"]
            }),
        },
        ToolSpec {
            name: "get_document_structure",
            description: "Get the structure of a document showing all its sections. Use this \
                          to understand the organization of a document.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "document_id": {
                        "type": "string",
                        "description": "The UUID of the document"
                    }
                },
                "required": ["document_id"]
            }),
        },
        ToolSpec {
            name: "search_by_file_path",
            description: "List all sections in documents matching a file path pattern. Use \
                          this when you know which file(s) to look at.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "path_pattern": {
                        "type": "string",
                        "description": "File path or pattern to match (e.g., 'agents/', 'handoffs.md')"
                    }
                },
                "required": ["path_pattern"]
            }),
        },
    ]
}
