use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::time::Duration;
use url::Url;

use crate::error::RelayError;
use super::{ ChatClient, GenerateRequest, GenerationOptions };

/// Client for an Ollama-compatible server: `POST /api/generate` for
/// completions, `GET /api/tags` for the model registry. The relay makes one
/// blocking call per turn; the HTTP client carries the request timeout.
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a GenerationOptions>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| RelayError::Upstream(format!("invalid base URL '{}': {}", base_url, e)))?;
        let http = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, RelayError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = GeneratePayload {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: (!request.options.is_empty()).then_some(&request.options),
        };

        info!("Calling upstream model '{}'", request.model);
        let resp = self.http.post(&url).json(&payload).send().await?.error_for_status()?;
        let data = resp
            .json::<GenerateResponse>().await
            .map_err(|e| RelayError::Upstream(format!("malformed generate response: {}", e)))?;

        Ok(data.response)
    }

    async fn list_models(&self) -> Result<Vec<String>, RelayError> {
        let url = format!("{}/api/tags", self.base_url);

        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let data = resp
            .json::<TagsResponse>().await
            .map_err(|e| RelayError::Upstream(format!("malformed tags response: {}", e)))?;

        Ok(data.models.into_iter().map(|m| m.name).collect())
    }
}
