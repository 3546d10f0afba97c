//! Per-run mutable agent state.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::ai::ModelMessage;
use crate::tools::ProposeEditOutcome;

/// Everything the agent accumulates over one run.
///
/// Owned by the orchestrator and lent mutably to the tool executor for the
/// duration of each call; nothing else holds a reference to it.
#[derive(Debug)]
pub struct AgentState {
    pub run_id: Uuid,
    pub request_text: String,
    /// Every search query issued, including repeats.
    pub searched_queries: Vec<String>,
    /// Section ids whose full content was retrieved.
    pub analyzed_sections: HashSet<String>,
    pub proposed_edits: Vec<ProposeEditOutcome>,
    pub transcript: Vec<ModelMessage>,
}

/// Summary counters reported when a run finishes.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AgentStats {
    pub searches_performed: usize,
    pub sections_analyzed: usize,
    pub suggestions_created: usize,
}

impl AgentState {
    pub fn new(run_id: Uuid, request_text: impl Into<String>) -> Self {
        Self {
            run_id,
            request_text: request_text.into(),
            searched_queries: Vec::new(),
            analyzed_sections: HashSet::new(),
            proposed_edits: Vec::new(),
            transcript: Vec::new(),
        }
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            searches_performed: self.searched_queries.len(),
            sections_analyzed: self.analyzed_sections.len(),
            suggestions_created: self.proposed_edits.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_repeats_and_dedupe_correctly() {
        let mut state = AgentState::new(Uuid::new_v4(), "update auth docs");
        state.searched_queries.push("auth".into());
        state.searched_queries.push("auth".into());
        state.analyzed_sections.insert("s1".into());
        state.analyzed_sections.insert("s1".into());

        let stats = state.stats();
        // Searches count every issue; sections are a set.
        assert_eq!(stats.searches_performed, 2);
        assert_eq!(stats.sections_analyzed, 1);
        assert_eq!(stats.suggestions_created, 0);
    }
}
