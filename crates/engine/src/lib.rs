//! # Nebula Engine
//!
//! Turn orchestration: retrieval, model calls, tool execution, and the
//! loop that ties them together. The engine owns the conversation
//! semantics; providers, retrievers, and tools are injected behind the
//! traits in `nebula-core`.

pub mod prompt;
pub mod turn;

pub use prompt::build_system_prompt;
pub use turn::{TurnEngine, TurnError, TurnOutcome};
