//! Concrete agent backends for agora sessions.
//!
//! - [`config`]: endpoint settings read from the environment
//! - [`ollama`]: [`agora_coordination::AgentClient`] over the Ollama chat API

pub mod config;
pub mod ollama;

pub use config::{check_endpoint, ClientConfig, ClientConfigError};
pub use ollama::OllamaClient;
