//! Completion provider layer.
//!
//! Transcript types mirror the chat-completions wire shape (roles, tool
//! calls, tool results keyed by call id) so a conversation can be resent
//! verbatim on every iteration. The actual HTTP client lives behind
//! [`CompletionClient`]; the core never talks to a provider directly.

pub mod types;

pub use types::{AssistantTurn, CompletionClient, ModelMessage, Role, ToolCallRequest};
