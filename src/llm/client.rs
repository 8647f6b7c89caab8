//! HTTP client for an `OpenAI`-compatible Responses API

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use super::types::{ModelResponse, ResponseRequest};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors from a language model call
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured
    #[error("no LLM provider configured")]
    NotConfigured,

    /// Transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider answered with something other than a response object
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A model that turns a request into a single response
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Issue one completion call
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the request
    async fn respond(&self, request: &ResponseRequest) -> Result<ModelResponse, LlmError>;
}

/// Responses API client
#[derive(Debug)]
pub struct ResponsesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl ResponsesClient {
    /// Create a client for the given base URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Whether an API key is available
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

#[async_trait]
impl LanguageModel for ResponsesClient {
    async fn respond(&self, request: &ResponseRequest) -> Result<ModelResponse, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::NotConfigured);
        };

        tracing::debug!(
            model = %request.model,
            input_items = request.input.len(),
            tools = request.tools.len(),
            "sending model request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
