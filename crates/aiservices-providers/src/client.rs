//! Generic HTTP client for provider APIs.
//!
//! Builds list-models (GET) and generate-content (POST) requests against a
//! configurable base URL and API version, applies authentication, and
//! decodes responses into JSON. Never retries; rate limits and upstream
//! faults surface as typed errors for the caller to handle.

use crate::auth::ApiKey;
use crate::error::{ProviderError, Result};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call request options passed down to the HTTP transport.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overall request timeout; the client default applies when unset.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A lazy sequence of decoded SSE JSON chunks.
pub type JsonStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// HTTP client bound to one provider API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_version: Option<String>,
    auth: ApiKey,
}

impl ApiClient {
    /// Create a client for `base_url` (optionally suffixed with an API
    /// version path segment) authenticating with `auth`.
    pub fn new(base_url: impl Into<String>, api_version: Option<&str>, auth: ApiKey) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.map(|v| v.trim_matches('/').to_string()),
            auth,
        })
    }

    /// Point the client at a different base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The fully-qualified URL for an API path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match &self.api_version {
            Some(version) => format!("{}/{}/{}", self.base_url, version, path),
            None => format!("{}/{}", self.base_url, path),
        }
    }

    fn apply_options(&self, request: RequestBuilder, options: &RequestOptions) -> RequestBuilder {
        let request = self.auth.authenticate(request);
        match options.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Perform a GET request and decode the JSON response body.
    pub async fn get_json(&self, path: &str, options: &RequestOptions) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, "GET");

        let request = self.apply_options(self.http.get(&url), options);
        let response = request.send().await?;
        Self::decode_json(response).await
    }

    /// Perform a POST request with a JSON body and decode the JSON response
    /// body.
    pub async fn post_json(&self, path: &str, body: &Value, options: &RequestOptions) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, "POST");

        let request = self.apply_options(self.http.post(&url), options).json(body);
        let response = request.send().await?;
        Self::decode_json(response).await
    }

    /// Perform a POST request and consume the response as a server-sent
    /// event stream of JSON chunks.
    ///
    /// The stream is lazy and single-pass. A `[DONE]` sentinel ends it;
    /// malformed chunk JSON and transport faults surface as `Err` items
    /// rather than being dropped.
    pub async fn post_sse(&self, path: &str, body: &Value, options: &RequestOptions) -> Result<JsonStream> {
        let url = self.url(path);
        debug!(%url, "POST (stream)");

        let request = self.apply_options(self.http.post(&url), options).json(body);
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        if event.data.is_empty() || event.data == "[DONE]" {
                            return None;
                        }
                        Some(serde_json::from_str::<Value>(&event.data).map_err(|e| {
                            warn!("Malformed SSE chunk: {e}");
                            ProviderError::stream(format!("malformed stream chunk: {e}"))
                        }))
                    }
                    Err(e) => Some(Err(ProviderError::stream(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }

    async fn decode_json(response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn error_from_response(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = error_message_from_body(&body);

        match status {
            401 | 403 => ProviderError::auth(message),
            429 => ProviderError::rate_limit(message, None),
            400 => ProviderError::invalid_request(message),
            _ => ProviderError::server_error(status, message),
        }
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Providers disagree on the envelope: `{"error": {"message": ...}}`,
/// `{"error": "..."}`, and `{"message": "..."}` all occur in the wild.
fn error_message_from_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .pointer("/error/message")
            .or_else(|| value.pointer("/error"))
            .or_else(|| value.pointer("/message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }
    if body.is_empty() {
        "Unknown error".to_string()
    } else {
        body.chars().take(200).collect()
    }
}

/// Fetch `key` from a decoded response object; a missing or null value is a
/// hard failure naming the key.
pub fn extract_key<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    match value.get(key) {
        Some(found) if !found.is_null() => Ok(found),
        _ => Err(ProviderError::missing_key(key)),
    }
}
