use async_trait::async_trait;

use crate::error::LlmError;

/// A backend that turns a prompt into raw completion text.
///
/// Implementations do not interpret the text; fence stripping and JSON
/// parsing live in [`LlmGateway`](crate::LlmGateway).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Sends one prompt and returns the model's text output.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
