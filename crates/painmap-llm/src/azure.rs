//! Azure OpenAI chat-completions provider, authenticated with an API key.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::LlmError;
use crate::http;
use crate::provider::LlmProvider;

const PROVIDER: &str = "azure";
const SYSTEM_PROMPT: &str = "You are an expert at analyzing product feedback and identifying \
                             recurring themes. Respond only with valid JSON.";
const TEMPERATURE: f64 = 0.3;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    response_format: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct AzureOpenAiProvider {
    client: Client,
    completions_url: Url,
    api_key: String,
}

impl AzureOpenAiProvider {
    /// Builds a provider for
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidEndpoint`] if the endpoint does not parse,
    /// or [`LlmError::Http`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_key: &str,
        deployment: &str,
        api_version: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let base = http::normalise_base_url(endpoint)?;
        let mut completions_url = http::join(
            &base,
            &format!("openai/deployments/{deployment}/chat/completions"),
        )?;
        completions_url
            .query_pairs_mut()
            .append_pair("api-version", api_version);

        Ok(Self {
            client: http::build_client(timeout_secs)?,
            completions_url,
            api_key: api_key.to_owned(),
        })
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            response_format: json!({ "type": "json_object" }),
        };
        let response = self
            .client
            .post(self.completions_url.clone())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let body = http::read_body(PROVIDER, response).await?;

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| LlmError::Parse {
            context: "azure chat completion".to_string(),
            source: e,
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse(PROVIDER))
    }
}
