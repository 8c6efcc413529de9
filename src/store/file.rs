use async_trait::async_trait;
use log::error;
use std::path::{ Path, PathBuf };
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::chat::{ now_millis, Conversation, ConversationSummary, Role };
use super::{ append_message, ConversationStore };

/// Flat-file backend: one JSON document per conversation under `dir`.
/// Mutations rewrite the whole record through a temp file and rename, so a
/// reader never sees a partial write. A store-wide lock serializes
/// read-modify-write cycles.
pub struct FileStore {
    dir: PathBuf,
    max_messages: usize,
    write_lock: Mutex<()>,
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl FileStore {
    pub async fn new(dir: impl AsRef<Path>, max_messages: usize) -> Result<Self, RelayError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            max_messages,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read_record(&self, id: &str) -> Result<Option<Conversation>, RelayError> {
        if !valid_id(id) {
            return Ok(None);
        }
        match fs::read(self.record_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, conversation: &Conversation) -> Result<(), RelayError> {
        let tmp = self.dir.join(format!("{}.json.tmp", conversation.id));
        fs::write(&tmp, serde_json::to_vec_pretty(conversation)?).await?;
        fs::rename(&tmp, self.record_path(&conversation.id)).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn create_conversation(&self, model: &str) -> Result<String, RelayError> {
        let _guard = self.write_lock.lock().await;
        let id = Uuid::new_v4().to_string();
        let conversation = Conversation::new(id.clone(), model.to_string());
        self.write_record(&conversation).await?;
        Ok(id)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RelayError> {
        self.read_record(id).await
    }

    async fn add_message(&self, id: &str, role: Role, content: &str) -> Result<(), RelayError> {
        let _guard = self.write_lock.lock().await;
        let mut conversation = self
            .read_record(id).await?
            .ok_or_else(|| RelayError::NotFound(id.to_string()))?;
        append_message(&mut conversation, role, content, self.max_messages);
        self.write_record(&conversation).await
    }

    async fn clear_conversation(&self, id: &str) -> Result<(), RelayError> {
        let _guard = self.write_lock.lock().await;
        let mut conversation = self
            .read_record(id).await?
            .ok_or_else(|| RelayError::NotFound(id.to_string()))?;
        conversation.messages.clear();
        conversation.last_updated = now_millis();
        self.write_record(&conversation).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), RelayError> {
        if !valid_id(id) {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, RelayError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut summaries = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Conversation>(&bytes) {
                    Ok(conversation) => summaries.push(ConversationSummary {
                        id: conversation.id,
                        last_updated: conversation.last_updated,
                    }),
                    Err(e) => error!("Skipping unreadable conversation file {}: {}", path.display(), e),
                },
                Err(e) => error!("Skipping conversation file {}: {}", path.display(), e),
            }
        }

        summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_a_conversation_record() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0).await.unwrap();
        let id = store.create_conversation("mistral").await.unwrap();

        store.add_message(&id, Role::User, "hello").await.unwrap();
        store.add_message(&id, Role::Assistant, "hi there").await.unwrap();

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.model, "mistral");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert!(conversation.last_updated >= conversation.messages[1].timestamp);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_store() {
        let dir = tempdir().unwrap();
        let id = {
            let store = FileStore::new(dir.path(), 0).await.unwrap();
            let id = store.create_conversation("mistral").await.unwrap();
            store.add_message(&id, Role::User, "persist me").await.unwrap();
            id
        };

        let reopened = FileStore::new(dir.path(), 0).await.unwrap();
        let conversation = reopened.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.messages[0].content, "persist me");
    }

    #[tokio::test]
    async fn missing_id_reads_as_none_and_mutates_as_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0).await.unwrap();

        assert!(store.get_conversation("absent").await.unwrap().is_none());
        let err = store.clear_conversation("absent").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0).await.unwrap();
        let id = store.create_conversation("mistral").await.unwrap();

        store.delete_conversation(&id).await.unwrap();
        store.delete_conversation(&id).await.unwrap();
        assert!(store.get_conversation(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_orders_by_last_updated_descending() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0).await.unwrap();
        let a = store.create_conversation("mistral").await.unwrap();
        let b = store.create_conversation("mistral").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.add_message(&a, Role::User, "bump").await.unwrap();

        let summaries = store.list_conversations().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, a);
        assert_eq!(summaries[1].id, b);
    }

    #[tokio::test]
    async fn message_cap_trims_oldest() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), 2).await.unwrap();
        let id = store.create_conversation("mistral").await.unwrap();

        store.add_message(&id, Role::User, "one").await.unwrap();
        store.add_message(&id, Role::Assistant, "two").await.unwrap();
        store.add_message(&id, Role::User, "three").await.unwrap();

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        let contents: Vec<&str> = conversation.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn hostile_ids_never_touch_the_filesystem() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), 0).await.unwrap();

        assert!(store.get_conversation("../../etc/passwd").await.unwrap().is_none());
        store.delete_conversation("../oops").await.unwrap();
    }
}
