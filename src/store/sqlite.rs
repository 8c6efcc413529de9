use async_trait::async_trait;
use rusqlite::{ params, OptionalExtension };
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::chat::{ now_millis, Conversation, ConversationSummary, Message, Role };
use super::ConversationStore;

/// Relational backend on an embedded SQLite database. All statements run on a
/// single background connection, so writes are serialized, and every mutation
/// happens inside a transaction.
pub struct SqliteStore {
    conn: Connection,
    max_messages: usize,
}

impl SqliteStore {
    pub async fn open(path: &str, max_messages: usize) -> Result<Self, RelayError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY NOT NULL,
                    model TEXT NOT NULL,
                    last_updated INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL
                        REFERENCES conversations(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    timestamp INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_conversation
                    ON messages (conversation_id, seq);
                CREATE INDEX IF NOT EXISTS idx_conversations_updated
                    ON conversations (last_updated);"
            )?;
            Ok(())
        }).await?;

        Ok(Self { conn, max_messages })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, model: &str) -> Result<String, RelayError> {
        let id = Uuid::new_v4().to_string();
        let stored_id = id.clone();
        let model = model.to_string();

        self.conn.call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, model, last_updated) VALUES (?1, ?2, ?3)",
                params![stored_id, model, now_millis()]
            )?;
            Ok(())
        }).await?;

        Ok(id)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RelayError> {
        let id = id.to_string();

        let conversation = self.conn.call(move |conn| {
            let header = conn
                .query_row(
                    "SELECT model, last_updated FROM conversations WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                )
                .optional()?;

            let Some((model, last_updated)) = header else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT role, content, timestamp FROM messages
                 WHERE conversation_id = ?1 ORDER BY seq ASC"
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content, timestamp) = row?;
                let role = Role::parse(&role)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                messages.push(Message { role, content, timestamp });
            }

            Ok(Some(Conversation { id, messages, model, last_updated }))
        }).await?;

        Ok(conversation)
    }

    async fn add_message(&self, id: &str, role: Role, content: &str) -> Result<(), RelayError> {
        let conversation_id = id.to_string();
        let content = content.to_string();
        let cap = self.max_messages as i64;

        let found = self.conn.call(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1",
                    params![conversation_id],
                    |row| row.get(0)
                )
                .optional()?;
            if exists.is_none() {
                return Ok(false);
            }

            let last_ts: i64 = tx.query_row(
                "SELECT COALESCE(MAX(timestamp), ?2) FROM messages WHERE conversation_id = ?1",
                params![conversation_id, i64::MIN],
                |row| row.get(0)
            )?;
            let timestamp = now_millis().max(last_ts);

            if cap > 0 {
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0)
                )?;
                let overflow = count + 1 - cap;
                if overflow > 0 {
                    tx.execute(
                        "DELETE FROM messages WHERE conversation_id = ?1 AND seq IN (
                            SELECT seq FROM messages WHERE conversation_id = ?1
                            ORDER BY seq ASC LIMIT ?2
                        )",
                        params![conversation_id, overflow]
                    )?;
                }
            }

            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![conversation_id, role.as_str(), content, timestamp]
            )?;
            tx.execute(
                "UPDATE conversations SET last_updated = ?2 WHERE id = ?1",
                params![conversation_id, timestamp]
            )?;

            tx.commit()?;
            Ok(true)
        }).await?;

        if found {
            Ok(())
        } else {
            Err(RelayError::NotFound(id.to_string()))
        }
    }

    async fn clear_conversation(&self, id: &str) -> Result<(), RelayError> {
        let conversation_id = id.to_string();

        let found = self.conn.call(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1",
                    params![conversation_id],
                    |row| row.get(0)
                )
                .optional()?;
            if exists.is_none() {
                return Ok(false);
            }

            tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation_id]
            )?;
            tx.execute(
                "UPDATE conversations SET last_updated = ?2 WHERE id = ?1",
                params![conversation_id, now_millis()]
            )?;

            tx.commit()?;
            Ok(true)
        }).await?;

        if found {
            Ok(())
        } else {
            Err(RelayError::NotFound(id.to_string()))
        }
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), RelayError> {
        let conversation_id = id.to_string();

        self.conn.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation_id]
            )?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", params![conversation_id])?;
            tx.commit()?;
            Ok(())
        }).await?;

        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, RelayError> {
        let summaries = self.conn.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, last_updated FROM conversations ORDER BY last_updated DESC"
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ConversationSummary {
                    id: row.get(0)?,
                    last_updated: row.get(1)?,
                })
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            Ok(summaries)
        }).await?;

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store(dir: &tempfile::TempDir, cap: usize) -> SqliteStore {
        let path = dir.path().join("relay.db");
        SqliteStore::open(path.to_str().unwrap(), cap).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_messages_in_append_order() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, 0).await;
        let id = store.create_conversation("llama3").await.unwrap();

        store.add_message(&id, Role::User, "hello").await.unwrap();
        store.add_message(&id, Role::Assistant, "hi there").await.unwrap();

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.model, "llama3");
        assert_eq!(conversation.messages[0].content, "hello");
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert!(conversation.messages[0].timestamp <= conversation.messages[1].timestamp);
        assert!(conversation.last_updated >= conversation.messages[1].timestamp);
    }

    #[tokio::test]
    async fn missing_conversation_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, 0).await;
        assert!(store.get_conversation("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_and_clear_report_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, 0).await;

        let err = store.add_message("absent", Role::User, "hi").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
        let err = store.clear_conversation("absent").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn clear_truncates_and_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, 0).await;
        let id = store.create_conversation("llama3").await.unwrap();
        store.add_message(&id, Role::User, "hello").await.unwrap();

        store.clear_conversation(&id).await.unwrap();
        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        assert!(conversation.messages.is_empty());

        store.delete_conversation(&id).await.unwrap();
        store.delete_conversation(&id).await.unwrap();
        assert!(store.get_conversation(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_orders_by_last_updated_descending() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, 0).await;
        let a = store.create_conversation("llama3").await.unwrap();
        let b = store.create_conversation("llama3").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.add_message(&a, Role::User, "bump").await.unwrap();

        let ids: Vec<String> = store
            .list_conversations()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn message_cap_trims_oldest_rows() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, 3).await;
        let id = store.create_conversation("llama3").await.unwrap();

        for n in 0..5 {
            store.add_message(&id, Role::User, &format!("msg-{}", n)).await.unwrap();
        }

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        let contents: Vec<&str> = conversation.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg-2", "msg-3", "msg-4"]);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let id = {
            let store = SqliteStore::open(path.to_str().unwrap(), 0).await.unwrap();
            let id = store.create_conversation("llama3").await.unwrap();
            store.add_message(&id, Role::User, "persist me").await.unwrap();
            id
        };

        let reopened = SqliteStore::open(path.to_str().unwrap(), 0).await.unwrap();
        let conversation = reopened.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.messages[0].content, "persist me");
    }
}
