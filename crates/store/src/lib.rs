//! # Nebula Store
//!
//! Conversation history storage. The `ConversationStore` trait lives in
//! `nebula-core`; this crate provides the bounded in-memory backend the
//! server runs with, plus the per-conversation locking that serializes
//! turns on the same history.

pub mod in_memory;
pub mod locks;

pub use in_memory::InMemoryConversationStore;
pub use locks::SessionLocks;
