pub mod api;
pub mod websocket;

use std::error::Error;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::cli::Args;
use crate::llm::{ ChatClient, GenerationOptions };
use crate::relay::ChatRelay;
use crate::store::ConversationStore;

/// Shared resources handed to every session. The store, upstream client, and
/// cache are the only shared state; each session gets its own `ChatRelay`.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn ConversationStore>,
    pub client: Arc<dyn ChatClient>,
    pub cache: Option<Arc<ResponseCache>>,
    pub args: Args,
}

impl AppContext {
    pub fn new_session(&self) -> ChatRelay {
        ChatRelay::new(
            Arc::clone(&self.store),
            Arc::clone(&self.client),
            self.cache.clone(),
            self.args.model.clone(),
            self.args.context_window,
            GenerationOptions::from_args(&self.args)
        )
    }
}

pub struct Server {
    addr: String,
    context: AppContext,
}

impl Server {
    pub fn new(addr: String, context: AppContext) -> Self {
        Self { addr, context }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.context.args.http_port {
            api::start_http_server(http_port, self.context.clone()).await?;
        }

        websocket::start_ws_server(&self.addr, self.context.clone()).await
    }
}
