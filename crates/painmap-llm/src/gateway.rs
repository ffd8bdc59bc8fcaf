//! Pacing, fence stripping and JSON parsing in front of one LLM provider.

use std::sync::Arc;
use std::time::Duration;

use painmap_core::{AppConfig, LlmProviderKind};
use serde_json::{Map, Value};

use crate::azure::AzureOpenAiProvider;
use crate::error::LlmError;
use crate::ollama::OllamaProvider;
use crate::provider::LlmProvider;

/// A parsed LLM reply. Callers only ever receive JSON objects.
pub type LlmObject = Map<String, Value>;

/// Uniform `send(prompt) -> object | None` over one configured provider.
///
/// Every call is preceded by a fixed pause. Transport errors, non-2xx
/// replies, and unparseable text are logged and reported as `None`; nothing
/// is retried.
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    request_delay: Duration,
    debug: bool,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("provider", &self.provider.name())
            .field("request_delay", &self.request_delay)
            .field("debug", &self.debug)
            .finish()
    }
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, request_delay: Duration, debug: bool) -> Self {
        Self {
            provider,
            request_delay,
            debug,
        }
    }

    /// Builds the provider selected by `LLM_PROVIDER`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidEndpoint`] for a malformed provider URL or
    /// missing Azure credentials, or [`LlmError::Http`] if the HTTP client
    /// cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let provider: Arc<dyn LlmProvider> = match config.llm_provider {
            LlmProviderKind::Ollama => Arc::new(OllamaProvider::new(
                &config.ollama_base_url,
                &config.ollama_model,
                config.llm_request_timeout_secs,
            )?),
            LlmProviderKind::Azure => {
                let missing = |what: &str| LlmError::InvalidEndpoint {
                    url: String::new(),
                    reason: format!("{what} is not configured"),
                };
                let endpoint = config
                    .azure_openai_endpoint
                    .as_deref()
                    .ok_or_else(|| missing("AZURE_OPENAI_ENDPOINT"))?;
                let api_key = config
                    .azure_openai_key
                    .as_deref()
                    .ok_or_else(|| missing("AZURE_OPENAI_KEY"))?;
                Arc::new(AzureOpenAiProvider::new(
                    endpoint,
                    api_key,
                    &config.azure_openai_deployment,
                    &config.azure_openai_api_version,
                    config.llm_request_timeout_secs,
                )?)
            }
        };

        let request_delay =
            Duration::try_from_secs_f64(config.llm_request_delay_secs).unwrap_or(Duration::ZERO);
        Ok(Self::new(provider, request_delay, config.clustering_debug))
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Sends `prompt` and returns the reply as a JSON object, or `None` on
    /// any failure.
    pub async fn send(&self, prompt: &str) -> Option<LlmObject> {
        if !self.request_delay.is_zero() {
            if self.debug {
                tracing::info!(
                    delay_secs = self.request_delay.as_secs_f64(),
                    "waiting before LLM request"
                );
            }
            tokio::time::sleep(self.request_delay).await;
        }

        let provider = self.provider.name();
        let text = match self.provider.complete(prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(provider, error = %e, "LLM request failed");
                return None;
            }
        };

        match parse_llm_response(&text) {
            Ok(object) => Some(object),
            Err(e) => {
                tracing::error!(provider, error = %e, "failed to parse LLM response");
                tracing::debug!(provider, response = %text, "unparseable LLM response text");
                None
            }
        }
    }
}

/// Removes a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parses model output into a JSON object after stripping any code fence.
///
/// # Errors
///
/// Returns [`LlmError::Parse`] if the text is not valid JSON or is valid JSON
/// but not an object.
pub fn parse_llm_response(text: &str) -> Result<LlmObject, LlmError> {
    let cleaned = strip_code_fence(text);
    let value: Value = serde_json::from_str(cleaned).map_err(|e| LlmError::Parse {
        context: "LLM completion text".to_string(),
        source: e,
    })?;
    match value {
        Value::Object(object) => Ok(object),
        other => Err(LlmError::Parse {
            context: "LLM completion text".to_string(),
            source: <serde_json::Error as serde::de::Error>::custom(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
