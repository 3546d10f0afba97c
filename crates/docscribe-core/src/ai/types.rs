//! Provider-facing conversation types.
//!
//! These are NOT domain types - they exist to carry the transcript to and
//! from the completion service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::spec::ToolSpec;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation requested by the assistant.
///
/// `id` is the correlation identifier; the matching tool-result turn must
/// carry the same id so the provider can pair them up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A single transcript turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on `Role::Tool` turns to correlate with the assistant's call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ModelMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Tool-result turn: the serialized result becomes the turn content,
    /// keyed by the originating call id.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// The assistant's reply for one iteration: either a plain-text
/// finalization (no tool calls) or a batch of tool invocations.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantTurn {
    /// A reply without tool calls ends the agent loop.
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }

    pub fn into_message(self) -> ModelMessage {
        ModelMessage {
            role: Role::Assistant,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: None,
        }
    }
}

/// Boundary to the completion service.
///
/// Implementations receive the full transcript plus the advertised tool
/// specifications on every call and pick tools automatically.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        transcript: &[ModelMessage],
        tools: &[ToolSpec],
    ) -> anyhow::Result<AssistantTurn>;
}
