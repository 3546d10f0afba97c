//! The agent's tool surface.
//!
//! Six fixed tools, a closed name set, schema definitions handed to the
//! model, argument validation, and the executor that dispatches validated
//! calls against storage and search.

pub mod args;
pub mod executor;
pub mod result;
pub mod spec;

pub use args::{ToolArgs, ValidationError};
pub use executor::ToolExecutor;
pub use result::{
    ProposeEditOutcome, SearchResultItem, StructureSection, ToolResult,
};
pub use spec::{tool_specs, ToolSpec};

/// Closed set of tools the agent can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SemanticSearch,
    GetSectionContent,
    FindDependencies,
    ProposeEdit,
    GetDocumentStructure,
    SearchByFilePath,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::SemanticSearch,
        ToolName::GetSectionContent,
        ToolName::FindDependencies,
        ToolName::ProposeEdit,
        ToolName::GetDocumentStructure,
        ToolName::SearchByFilePath,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::SemanticSearch => "semantic_search",
            ToolName::GetSectionContent => "get_section_content",
            ToolName::FindDependencies => "find_dependencies",
            ToolName::ProposeEdit => "propose_edit",
            ToolName::GetDocumentStructure => "get_document_structure",
            ToolName::SearchByFilePath => "search_by_file_path",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "semantic_search" => Some(ToolName::SemanticSearch),
            "get_section_content" => Some(ToolName::GetSectionContent),
            "find_dependencies" => Some(ToolName::FindDependencies),
            "propose_edit" => Some(ToolName::ProposeEdit),
            "get_document_structure" => Some(ToolName::GetDocumentStructure),
            "search_by_file_path" => Some(ToolName::SearchByFilePath),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ToolName::parse("delete_everything"), None);
    }
}
