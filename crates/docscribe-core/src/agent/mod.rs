//! The documentation analysis agent.
//!
//! A bounded tool-calling loop: the model reads the update request, calls
//! tools to explore the documentation, and proposes edits; the orchestrator
//! drives iterations, persists run status, and reports progress events.

mod orchestrator;
pub mod prompts;
mod state;

pub use orchestrator::{ProcessOutcome, QueryOrchestrator, MAX_ITERATIONS};
pub use state::{AgentState, AgentStats};
