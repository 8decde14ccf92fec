//! # Nebula Core
//!
//! Domain types, traits, and error definitions for the Nebula chat
//! service. This crate has **zero framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the turn engine is defined as a trait here
//! (Provider, Retriever, Tool, ConversationStore). Implementations live
//! in their respective crates and are injected once at process start.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod retriever;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, ToolCallRequest};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ToolDefinition, Usage,
};
pub use retriever::Retriever;
pub use store::ConversationStore;
pub use tool::{Tool, ToolRegistry, ToolResult};
