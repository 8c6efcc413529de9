use serde::{ Serialize, Deserialize };

use super::chat::ConversationSummary;

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
        #[serde(default)]
        temperature: Option<f32>,
    },
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "list_conversations")]
    ListConversations,
    #[serde(rename = "load_conversation")] LoadConversation {
        id: String,
    },
    #[serde(rename = "list_models")]
    ListModels,
    #[serde(rename = "set_model")] SetModel {
        name: String,
    },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "conversation_started")] ConversationStarted {
        id: String,
    },
    #[serde(rename = "response")] Response {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "cleared")] Cleared {
        id: String,
    },
    #[serde(rename = "conversations")] Conversations {
        conversations: Vec<ConversationSummary>,
    },
    #[serde(rename = "loaded")] Loaded {
        id: String,
    },
    #[serde(rename = "models")] Models {
        models: Vec<String>,
    },
    #[serde(rename = "model_set")] ModelSet {
        model: String,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}
