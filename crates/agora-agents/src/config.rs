use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Default chat model.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Errors building a client from its configuration.
#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("endpoint url must start with http:// or https://: {0}")]
    InvalidUrl(String),

    #[error("model name is empty")]
    EmptyModel,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Inference endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    pub model: String,
    /// Transport-level timeout for one HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("AGORA_OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.into()),
            model: std::env::var("AGORA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            request_timeout_secs: 180,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ClientConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ClientConfigError::InvalidUrl(self.url.clone()));
        }
        if self.model.trim().is_empty() {
            return Err(ClientConfigError::EmptyModel);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Check if an Ollama endpoint is reachable (GET /api/tags).
pub async fn check_endpoint(url: &str) -> bool {
    let tags_url = format!("{}/api/tags", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&tags_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
