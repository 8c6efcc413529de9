pub mod memory;
pub mod file;
pub mod sqlite;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::cli::Args;
use crate::error::RelayError;
use crate::models::chat::{ now_millis, Conversation, ConversationSummary, Message, Role };

/// Persistence contract for conversations. Every mutating call durably
/// persists the whole updated record; writes within one store are serialized
/// so a reader never observes a torn record.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Allocates a fresh unique id with an empty message sequence.
    async fn create_conversation(&self, model: &str) -> Result<String, RelayError>;

    /// Returns the full record, or `None` for a missing id. Absence is not an
    /// error; callers must check.
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RelayError>;

    /// Appends a message with a server-assigned timestamp. Oldest messages are
    /// dropped first once the per-conversation cap is reached.
    async fn add_message(&self, id: &str, role: Role, content: &str) -> Result<(), RelayError>;

    /// Truncates the message sequence to empty and bumps `last_updated`.
    async fn clear_conversation(&self, id: &str) -> Result<(), RelayError>;

    /// Removes the record entirely. Idempotent.
    async fn delete_conversation(&self, id: &str) -> Result<(), RelayError>;

    /// All conversations, ordered by `last_updated` descending.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, RelayError>;
}

pub async fn create_store(args: &Args) -> Result<Arc<dyn ConversationStore>, RelayError> {
    info!("Conversations will be stored in: {}", args.store_type);
    match args.store_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(memory::MemoryStore::new(args.max_messages))),
        "file" => {
            let store = file::FileStore::new(&args.store_dir, args.max_messages).await?;
            Ok(Arc::new(store))
        }
        "sqlite" => {
            let store = sqlite::SqliteStore::open(&args.store_sqlite_path, args.max_messages).await?;
            Ok(Arc::new(store))
        }
        other => Err(RelayError::Storage(format!("unsupported store type: {}", other))),
    }
}

/// Appends in place: timestamp clamped to stay monotonic, FIFO trim to the
/// cap (0 = unbounded) before insert, `last_updated` bumped to the new
/// timestamp. Shared by the whole-record backends (memory, file).
pub(crate) fn append_message(conversation: &mut Conversation, role: Role, content: &str, cap: usize) {
    let last_ts = conversation.messages.last().map(|m| m.timestamp).unwrap_or(i64::MIN);
    let timestamp = now_millis().max(last_ts);

    if cap > 0 {
        while conversation.messages.len() + 1 > cap {
            conversation.messages.remove(0);
        }
    }

    conversation.messages.push(Message {
        role,
        content: content.to_string(),
        timestamp,
    });
    conversation.last_updated = timestamp;
}
