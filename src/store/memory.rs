use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::chat::{ now_millis, Conversation, ConversationSummary, Role };
use super::{ append_message, ConversationStore };

/// In-process backend: conversations keyed by id behind a single lock.
/// Writes take the write lock, so read-modify-append is serialized.
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    max_messages: usize,
}

impl MemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_messages,
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, model: &str) -> Result<String, RelayError> {
        let id = Uuid::new_v4().to_string();
        let conversation = Conversation::new(id.clone(), model.to_string());
        self.conversations.write().await.insert(id.clone(), conversation);
        Ok(id)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RelayError> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn add_message(&self, id: &str, role: Role, content: &str) -> Result<(), RelayError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| RelayError::NotFound(id.to_string()))?;
        append_message(conversation, role, content, self.max_messages);
        Ok(())
    }

    async fn clear_conversation(&self, id: &str) -> Result<(), RelayError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| RelayError::NotFound(id.to_string()))?;
        conversation.messages.clear();
        conversation.last_updated = now_millis();
        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), RelayError> {
        self.conversations.write().await.remove(id);
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, RelayError> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .values()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                last_updated: c.last_updated,
            })
            .collect();
        summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_message_appends_with_monotonic_timestamps() {
        let store = MemoryStore::new(0);
        let id = store.create_conversation("mistral").await.unwrap();

        store.add_message(&id, Role::User, "first").await.unwrap();
        store.add_message(&id, Role::Assistant, "second").await.unwrap();
        store.add_message(&id, Role::User, "third").await.unwrap();

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 3);
        assert_eq!(conversation.messages[2].content, "third");
        assert!(conversation.messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(conversation.last_updated >= conversation.messages[2].timestamp);
    }

    #[tokio::test]
    async fn add_message_to_missing_conversation_is_not_found() {
        let store = MemoryStore::new(0);
        let err = store.add_message("nope", Role::User, "hi").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn clear_conversation_truncates_to_empty() {
        let store = MemoryStore::new(0);
        let id = store.create_conversation("mistral").await.unwrap();
        store.add_message(&id, Role::User, "hello").await.unwrap();

        store.clear_conversation(&id).await.unwrap();

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        assert!(conversation.messages.is_empty());
    }

    #[tokio::test]
    async fn delete_conversation_is_idempotent() {
        let store = MemoryStore::new(0);
        let id = store.create_conversation("mistral").await.unwrap();

        store.delete_conversation(&id).await.unwrap();
        store.delete_conversation(&id).await.unwrap();

        assert!(store.get_conversation(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_conversations_sorts_by_last_updated_descending() {
        let store = MemoryStore::new(0);
        let first = store.create_conversation("mistral").await.unwrap();
        let second = store.create_conversation("mistral").await.unwrap();
        let third = store.create_conversation("mistral").await.unwrap();

        // Touch them out of creation order; the most recently touched wins.
        for id in [&second, &first, &third] {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            store.add_message(id, Role::User, "ping").await.unwrap();
        }

        let ids: Vec<String> = store
            .list_conversations()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![third.clone(), first.clone(), second.clone()]);
    }

    #[tokio::test]
    async fn message_cap_drops_oldest_first() {
        let store = MemoryStore::new(3);
        let id = store.create_conversation("mistral").await.unwrap();

        for n in 0..5 {
            store.add_message(&id, Role::User, &format!("msg-{}", n)).await.unwrap();
        }

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        let contents: Vec<&str> = conversation.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg-2", "msg-3", "msg-4"]);
    }
}
