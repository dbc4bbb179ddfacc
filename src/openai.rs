// Shared plumbing for OpenAI-compatible HTTP endpoints.
//
// Both the transcription and the translation providers talk to the same API
// family; they share client construction and the mapping from HTTP failures
// to transient/fatal remote errors.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SubversesError};

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    organization: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        organization: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubversesError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            organization,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST request with auth headers applied
    pub fn post(&self, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("POST {}", url);

        let mut request = self.client.post(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        request
    }

    /// Send and classify the outcome; only successful responses are returned
    pub async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| classify_transport(e, what))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, what))
    }
}

/// Timeouts and connection failures are worth retrying; anything else about the request is not
pub fn classify_transport(error: reqwest::Error, what: &str) -> SubversesError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        SubversesError::TransientRemote(format!("{} request failed: {}", what, error))
    } else {
        SubversesError::FatalRemote(format!("{} request failed: {}", what, error))
    }
}

pub fn classify_status(status: StatusCode, body: &str, what: &str) -> SubversesError {
    let message = format!("{} API error {}: {}", what, status, body.trim());
    if is_retryable_status(status) {
        SubversesError::TransientRemote(message)
    } else {
        SubversesError::FatalRemote(message)
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::CONFLICT
}
