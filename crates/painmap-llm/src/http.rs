use std::time::Duration;

use reqwest::{Client, Response, Url};

use crate::error::LlmError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "painmap/0.1 (theme-clustering)";

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, LlmError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Parses `base` with exactly one trailing slash so that `Url::join` appends
/// to the path instead of replacing its last segment.
pub(crate) fn normalise_base_url(base: &str) -> Result<Url, LlmError> {
    let normalised = format!("{}/", base.trim().trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| LlmError::InvalidEndpoint {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, LlmError> {
    base.join(path).map_err(|e| LlmError::InvalidEndpoint {
        url: format!("{base}{path}"),
        reason: e.to_string(),
    })
}

/// Returns the body as text, or [`LlmError::UnexpectedStatus`] for non-2xx.
pub(crate) async fn read_body(
    provider: &'static str,
    response: Response,
) -> Result<String, LlmError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(LlmError::UnexpectedStatus {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
