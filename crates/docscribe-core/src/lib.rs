//! docscribe-core: the documentation update agent.
//!
//! An LLM-driven loop that takes a natural-language documentation update
//! request, explores the documentation through a fixed tool set, and
//! persists reviewable edit suggestions. The crate provides:
//!
//! - [`agent`]: the bounded tool-calling orchestrator
//! - [`tools`]: tool schemas, validation, and dispatch
//! - [`events`]: the dual-mode progress event bus
//! - [`storage`]: SQLite persistence for runs, documents, and suggestions
//! - [`search`] / [`ai`]: the traits host processes implement to plug in
//!   a semantic index and a completion provider
//! - [`deps`]: cross-reference extraction and the dependency graph

pub mod agent;
pub mod ai;
pub mod deps;
pub mod events;
pub mod search;
pub mod storage;
pub mod tools;

pub use agent::{ProcessOutcome, QueryOrchestrator, MAX_ITERATIONS};
pub use ai::CompletionClient;
pub use events::{EventEmitter, QueryEvent};
pub use search::SearchIndex;
pub use storage::Database;
