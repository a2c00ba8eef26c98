//! HTTP plumbing shared by every adapter.

use std::time::Duration;

use agentrun_core::error::ProviderError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

/// Default request timeout. Tool-heavy turns on large models can be slow.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Build the shared HTTP client.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))
}

/// Send a prepared request and decode a successful JSON reply.
///
/// Status mapping: 429 is rate limiting, 401/403 is an auth failure, any
/// other non-2xx status is an API error carrying the response body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status().as_u16();

    if status == 429 {
        return Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(format!(
            "{provider} rejected the credentials (status {status})"
        )));
    }

    if !(200..300).contains(&status) {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    parse_body(provider, &text)
}

/// Decode a response body, naming the provider on failure.
pub(crate) fn parse_body<T: DeserializeOwned>(provider: &str, text: &str) -> Result<T, ProviderError> {
    serde_json::from_str(text).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse {provider} response: {e}"))
    })
}

/// Merge vendor parameters into a request object. Explicit parameters win.
pub(crate) fn merge_params(target: &mut Value, params: &Map<String, Value>) {
    if params.is_empty() {
        return;
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Some(obj) = target.as_object_mut() {
        for (key, value) in params {
            obj.insert(key.clone(), value.clone());
        }
    }
}
