use log::{ info, warn };
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::error::RelayError;
use crate::llm::{ ChatClient, GenerateRequest, GenerationOptions };
use crate::models::chat::{ ConversationSummary, Message, Role };
use crate::store::ConversationStore;

/// One client session: owns the active-conversation pointer and the active
/// model, shares the store, upstream client, and cache with other sessions.
pub struct ChatRelay {
    store: Arc<dyn ConversationStore>,
    client: Arc<dyn ChatClient>,
    cache: Option<Arc<ResponseCache>>,
    model: String,
    context_window: usize,
    options: GenerationOptions,
    current_conversation_id: Option<String>,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        client: Arc<dyn ChatClient>,
        cache: Option<Arc<ResponseCache>>,
        model: String,
        context_window: usize,
        options: GenerationOptions
    ) -> Self {
        Self {
            store,
            client,
            cache,
            model,
            context_window,
            options,
            current_conversation_id: None,
        }
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn init_conversation(&mut self) -> Result<String, RelayError> {
        let id = self.store.create_conversation(&self.model).await?;
        info!("Started conversation {} with model '{}'", id, self.model);
        self.current_conversation_id = Some(id.clone());
        Ok(id)
    }

    /// Relays one prompt. Creates a conversation first if none is active (the
    /// auto-start side effect). On an upstream failure the user turn stays
    /// persisted and no assistant turn is appended; there is no retry.
    pub async fn generate(
        &mut self,
        prompt: &str,
        temperature: Option<f32>
    ) -> Result<String, RelayError> {
        if prompt.trim().is_empty() {
            return Err(RelayError::Validation("prompt is empty".to_string()));
        }

        let id = match &self.current_conversation_id {
            Some(id) => id.clone(),
            None => self.init_conversation().await?,
        };

        self.store.add_message(&id, Role::User, prompt).await?;

        let conversation = self.store
            .get_conversation(&id).await?
            .ok_or_else(|| RelayError::NotFound(id.clone()))?;
        let context = assemble_context(&conversation.messages, self.context_window);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&self.model, &context) {
                info!("Cache hit for model '{}', skipping upstream call", self.model);
                self.store.add_message(&id, Role::Assistant, &cached).await?;
                return Ok(cached);
            }
        }

        let mut options = self.options;
        if temperature.is_some() {
            options.temperature = temperature;
        }
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: context.clone(),
            options,
        };

        let response = self.client.complete(&request).await.map_err(|e| {
            warn!("Upstream call failed for conversation {}: {}", id, e);
            e
        })?;

        if let Some(cache) = &self.cache {
            cache.put(&self.model, &context, &response);
        }
        self.store.add_message(&id, Role::Assistant, &response).await?;

        Ok(response)
    }

    /// Clear is destroy-and-recreate: the active record is deleted and a fresh
    /// conversation becomes active, so no reference to partially-cleared state
    /// can survive. Returns the new active id.
    pub async fn clear_current_conversation(&mut self) -> Result<String, RelayError> {
        if let Some(id) = self.current_conversation_id.take() {
            self.store.delete_conversation(&id).await?;
        }
        self.init_conversation().await
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, RelayError> {
        self.store.list_conversations().await
    }

    /// Switches the session to an existing conversation, adopting its model so
    /// the context never mixes messages generated under different models.
    pub async fn load_conversation(&mut self, id: &str) -> Result<(), RelayError> {
        let conversation = self.store
            .get_conversation(id).await?
            .ok_or_else(|| RelayError::NotFound(id.to_string()))?;
        self.model = conversation.model;
        self.current_conversation_id = Some(id.to_string());
        Ok(())
    }

    pub async fn available_models(&self) -> Result<Vec<String>, RelayError> {
        self.client.list_models().await
    }

    /// Switches the active model. The active conversation pointer is dropped,
    /// so the next `generate` auto-starts a fresh conversation under the new
    /// model.
    pub fn set_model(&mut self, name: &str) {
        if name != self.model {
            info!("Switching model from '{}' to '{}'", self.model, name);
            self.model = name.to_string();
            self.current_conversation_id = None;
        }
    }
}

/// Joins the most recent `window` messages into the upstream prompt. Older
/// history is dropped from the prompt only, never from storage.
pub fn assemble_context(messages: &[Message], window: usize) -> String {
    let start = messages.len().saturating_sub(window);
    let recent = &messages[start..];
    if recent.is_empty() {
        return String::new();
    }

    let mut result = String::from("Previous conversation:\n");
    for msg in recent {
        let role_display = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        result.push_str(&format!("{}: {}\n", role_display, msg.content));
    }

    result
}
