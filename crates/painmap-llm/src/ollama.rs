//! Self-hosted Ollama provider (`POST /api/generate`, non-streaming, JSON mode).

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http;
use crate::provider::LlmProvider;

const PROVIDER: &str = "ollama";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

pub struct OllamaProvider {
    client: Client,
    generate_url: Url,
    model: String,
}

impl OllamaProvider {
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidEndpoint`] if `base_url` does not parse, or
    /// [`LlmError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let base = http::normalise_base_url(base_url)?;
        Ok(Self {
            client: http::build_client(timeout_secs)?,
            generate_url: http::join(&base, "api/generate")?,
            model: model.to_owned(),
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(self.generate_url.clone())
            .json(&request)
            .send()
            .await?;
        let body = http::read_body(PROVIDER, response).await?;

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse {
                context: "ollama generate response".to_string(),
                source: e,
            })?;

        parsed
            .response
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse(PROVIDER))
    }
}
