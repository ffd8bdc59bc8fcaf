//! LLM gateway for the clustering pipeline.
//!
//! [`LlmGateway`] wraps one [`LlmProvider`] chosen at startup and turns its
//! free-form text output into JSON objects, pacing every request.

pub mod azure;
pub mod error;
pub mod gateway;
mod http;
pub mod ollama;
pub mod provider;

pub use azure::AzureOpenAiProvider;
pub use error::LlmError;
pub use gateway::{parse_llm_response, strip_code_fence, LlmGateway, LlmObject};
pub use ollama::OllamaProvider;
pub use provider::LlmProvider;
