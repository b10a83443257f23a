//! Ollama chat client
//!
//! One non-streaming POST to `/api/chat` per generation. Retries and
//! fallbacks are the caller's concern (`agora_coordination::ResilientClient`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use agora_coordination::{AgentClient, GenerationError, GenerationRequest};

use crate::config::{ClientConfig, ClientConfigError};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Sampling options in Ollama's naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    error: Option<String>,
}

/// Request body for one generation, exposed for inspection in tests.
pub fn chat_body(model: &str, request: &GenerationRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.trim().is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });

    let body = ChatRequest {
        model,
        messages,
        stream: false,
        options: ChatOptions {
            temperature: request.params.temperature,
            num_predict: request.params.max_tokens,
            top_p: request.params.top_p,
            presence_penalty: request.params.presence_penalty,
            frequency_penalty: request.params.frequency_penalty,
        },
    };
    serde_json::to_value(body).unwrap_or_default()
}

/// Pull the reply text out of an `/api/chat` response body.
pub fn parse_chat_response(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Transport(format!("invalid response body: {}", e)))?;
    if let Some(error) = parsed.error {
        return Err(GenerationError::Model(error));
    }
    let content = parsed.message.map(|m| m.content).unwrap_or_default();
    if content.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(content)
}

/// [`AgentClient`] backed by a local or remote Ollama server.
pub struct OllamaClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url())
    }
}

#[async_trait]
impl AgentClient for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = chat_body(&self.config.model, request);
        debug!(
            agent = %request.agent_id,
            model = %self.config.model,
            temperature = request.params.temperature,
            max_tokens = request.params.max_tokens,
            "POST /api/chat"
        );

        let response = self
            .http
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.config.request_timeout())
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Model(format!("HTTP {}: {}", status, text.trim())));
        }
        parse_chat_response(&text)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
