//! In-memory conversation store with a bounded capacity.

use async_trait::async_trait;
use nebula_core::error::StoreError;
use nebula_core::message::{Conversation, ConversationId};
use nebula_core::store::ConversationStore;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

/// Holds conversation histories in a map, bounded by `capacity`.
///
/// Inserting a new conversation at capacity evicts the one that went
/// longest without an update. Replacing an existing conversation never
/// evicts.
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    capacity: usize,
}

impl InMemoryConversationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            capacity,
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.get(&id.0).cloned())
    }

    async fn put(&self, conversation: Conversation) -> std::result::Result<(), StoreError> {
        let mut map = self.conversations.write().await;
        let key = conversation.id.to_string();

        if !map.contains_key(&key) && map.len() >= self.capacity {
            let oldest = map
                .iter()
                .min_by_key(|(_, c)| c.updated_at)
                .map(|(id, _)| id.clone());
            if let Some(evicted) = oldest {
                map.remove(&evicted);
                warn!(conversation_id = %evicted, "Store at capacity, evicted least recently updated conversation");
            }
        }

        map.insert(key, conversation);
        Ok(())
    }

    async fn count(&self) -> usize {
        self.conversations.read().await.len()
    }
}
