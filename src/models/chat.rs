use chrono::Utc;
use serde::{ Serialize, Deserialize };

use crate::error::RelayError;

/// Who authored a message. Conversations only ever hold these two roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RelayError> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(RelayError::Storage(format!("unknown message role: {}", other))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a conversation. Immutable once appended; timestamps are
/// server-assigned and monotonic within a conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

/// An ordered sequence of messages tied to one model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub model: String,
    pub last_updated: i64,
}

impl Conversation {
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            messages: Vec::new(),
            model,
            last_updated: now_millis(),
        }
    }
}

/// Listing entry, ordered by `last_updated` descending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub last_updated: i64,
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
