use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Conversation Store Args ---
    /// Conversation store backend (memory, file, sqlite)
    #[arg(long, env = "STORE_TYPE", default_value = "file")]
    pub store_type: String,

    /// Directory for the file backend (one JSON document per conversation).
    #[arg(long, env = "STORE_DIR", default_value = "conversations")]
    pub store_dir: String,

    /// Database path for the sqlite backend.
    #[arg(long, env = "STORE_SQLITE_PATH", default_value = "conversations.db")]
    pub store_sqlite_path: String,

    /// Maximum messages kept per conversation; the oldest are dropped first on
    /// overflow. 0 disables the cap.
    #[arg(long, env = "MAX_MESSAGES", default_value = "100")]
    pub max_messages: usize,

    // --- Upstream Model Server Args ---
    /// Base URL of the Ollama-compatible model server.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub base_url: String,

    /// Default model name for new conversations.
    #[arg(long, env = "OLLAMA_MODEL", default_value = "mistral")]
    pub model: String,

    /// Number of most recent messages sent upstream per call. Older history
    /// stays in storage but is dropped from the prompt.
    #[arg(long, env = "CONTEXT_WINDOW", default_value = "30")]
    pub context_window: usize,

    /// Upstream request timeout in seconds.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "120")]
    pub upstream_timeout_secs: u64,

    // --- Generation Option Args ---
    /// Default sampling temperature; per-request values override this.
    #[arg(long, env = "TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Top-k sampling parameter.
    #[arg(long, env = "TOP_K")]
    pub top_k: Option<u32>,

    /// Top-p (nucleus) sampling parameter.
    #[arg(long, env = "TOP_P")]
    pub top_p: Option<f32>,

    /// Context window size, in tokens, advertised to the model server.
    #[arg(long, env = "NUM_CTX")]
    pub num_ctx: Option<u32>,

    /// Number of threads the model server should use.
    #[arg(long, env = "NUM_THREAD")]
    pub num_thread: Option<u32>,

    // --- Caching Args ---
    /// Enable the (model, context) response cache.
    #[arg(long, env = "ENABLE_CACHE", default_value = "false")]
    pub enable_cache: bool,

    /// Maximum number of cached responses.
    #[arg(long, env = "CACHE_CAPACITY", default_value = "256")]
    pub cache_capacity: usize,

    // --- Server Args ---
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP API. Disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,
}
