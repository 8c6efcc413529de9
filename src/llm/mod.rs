pub mod ollama;

use async_trait::async_trait;
use serde::Serialize;

use crate::cli::Args;
use crate::error::RelayError;

/// Generation tuning passed through to the upstream server. All fields are
/// optional; unset fields are omitted from the request body so the server's
/// own defaults apply.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_thread: Option<u32>,
}

impl GenerationOptions {
    pub fn from_args(args: &Args) -> Self {
        Self {
            temperature: args.temperature,
            top_k: args.top_k,
            top_p: args.top_p,
            num_ctx: args.num_ctx,
            num_thread: args.num_thread,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_k.is_none()
            && self.top_p.is_none()
            && self.num_ctx.is_none()
            && self.num_thread.is_none()
    }
}

/// One completion request: model name plus the fully assembled context.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub options: GenerationOptions,
}

/// Upstream model server seam. The relay only ever needs a single synchronous
/// completion and the model registry listing.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, RelayError>;

    async fn list_models(&self) -> Result<Vec<String>, RelayError>;
}
