pub mod cache;
pub mod cli;
pub mod error;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod store;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::cache::ResponseCache;
use crate::cli::Args;
use crate::llm::ollama::OllamaClient;
use crate::server::{ AppContext, Server };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Conversation store: {}", args.store_type);
    info!("Upstream model server: {}", args.base_url);
    info!("Default model: {}", args.model);
    if args.enable_cache {
        info!("Response cache enabled (capacity {})", args.cache_capacity);
    }

    let store = store::create_store(&args).await?;
    let client = Arc::new(
        OllamaClient::new(&args.base_url, Duration::from_secs(args.upstream_timeout_secs))?
    );
    let cache = args.enable_cache.then(|| Arc::new(ResponseCache::new(args.cache_capacity)));

    let context = AppContext {
        store,
        client,
        cache,
        args: args.clone(),
    };

    Server::new(args.server_addr.clone(), context).run().await
}
