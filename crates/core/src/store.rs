//! ConversationStore trait: the history persistence boundary.
//!
//! The HTTP layer reads a conversation, runs one turn against it, and
//! writes the updated conversation back. The store decides capacity and
//! eviction; callers must serialize the read-modify-write per
//! conversation id (see `SessionLocks` in the store crate).

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId};
use async_trait::async_trait;

/// A mapping from conversation id to ordered message history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation by id, if present.
    async fn get(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<Conversation>, StoreError>;

    /// Insert or replace a conversation under its own id.
    async fn put(&self, conversation: Conversation) -> std::result::Result<(), StoreError>;

    /// Number of conversations currently held.
    async fn count(&self) -> usize;
}
