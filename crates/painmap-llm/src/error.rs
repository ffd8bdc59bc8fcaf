use thiserror::Error;

/// Errors raised by an [`LlmProvider`](crate::LlmProvider).
///
/// These never escape [`LlmGateway::send`](crate::LlmGateway::send); the
/// gateway logs them and reports a soft failure.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network, TLS, or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("{provider} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The provider envelope parsed but carried no completion text.
    #[error("{0} response contained no completion text")]
    EmptyResponse(&'static str),

    /// The response body could not be deserialized.
    #[error("JSON deserialization error for {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}
