//! Agent client seam: turns a prompt plus sampling parameters into text.
//!
//! The orchestration layer only ever sees this trait. Concrete transports
//! (Ollama over HTTP in `agora-agents`, scripted clients in tests) implement
//! it, and [`crate::resilience::ResilientClient`] wraps it with retry and
//! fallback so a state machine never observes a [`GenerationError`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Per-agent sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Replaces the persona-derived system prompt when set.
    pub system_prompt_override: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 300,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            system_prompt_override: None,
        }
    }
}

impl GenerationParams {
    /// Low-temperature, short-output variant used for ballots.
    pub fn for_ballot(&self) -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 60,
            ..self.clone()
        }
    }

    /// Long-output variant used for the final composed artifact.
    pub fn for_final_output(&self) -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 2000,
            ..self.clone()
        }
    }
}

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Agent or player the call is made on behalf of. Used for logging and
    /// by scripted clients to pick a reply.
    pub agent_id: String,
    pub system_prompt: String,
    pub prompt: String,
    pub params: GenerationParams,
}

impl GenerationRequest {
    pub fn new(agent_id: &str, system_prompt: String, prompt: String, params: GenerationParams) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            system_prompt,
            prompt,
            params,
        }
    }
}

/// Capability that produces text for a single agent turn.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Generate a response. Transport and model failures are reported as
    /// [`GenerationError`]; the caller decides whether to retry.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Name reported in degraded-response metadata.
    fn name(&self) -> &str {
        "agent-client"
    }
}

/// Shared reference to a client.
pub type SharedAgentClient = Arc<dyn AgentClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ballot_params_keep_override() {
        let params = GenerationParams {
            temperature: 0.9,
            system_prompt_override: Some("be brief".into()),
            ..Default::default()
        };
        let ballot = params.for_ballot();
        assert_eq!(ballot.temperature, 0.1);
        assert_eq!(ballot.max_tokens, 60);
        assert_eq!(ballot.system_prompt_override.as_deref(), Some("be brief"));
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: GenerationParams = serde_json::from_str(r#"{"temperature": 0.3}"#).unwrap();
        assert_eq!(params.temperature, 0.3);
        assert_eq!(params.max_tokens, 300);
        assert_eq!(params.top_p, 1.0);
    }
}
