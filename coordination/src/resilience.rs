//! Resilience: retry, deadline, and fallback text for agent turns
//!
//! Every agent turn yields *some* text. Generation failures are retried with a
//! fixed backoff, and when the retry budget is exhausted a pre-authored
//! fallback sentence stands in for the response. The only outcome that is not
//! text is [`Cancelled`], raised when the session pause signal fires.
//!
//! # Design
//!
//! ```text
//! generate(request)
//!   ├─ first attempt succeeds         → DegradedResponse { level: Full, .. }
//!   ├─ succeeds after N retries       → DegradedResponse { level: Partial, warnings, .. }
//!   ├─ retries exhausted              → DegradedResponse { level: Unavailable, payload: fallback }
//!   └─ pause token cancelled anywhere → Err(Cancelled)
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{GenerationRequest, SharedAgentClient};
use crate::error::{Cancelled, GenerationError};

/// How much of the agent's real output made it into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DegradationLevel {
    /// First attempt succeeded.
    Full,
    /// Real output, but only after one or more retries.
    Partial,
    /// Retries exhausted; payload is fallback text.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A response wrapped with degradation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResponse<T> {
    pub payload: T,
    pub level: DegradationLevel,
    /// 1.0 for a first-try success, lower per retry, 0.0 for fallback text.
    pub confidence: f64,
    /// Which client produced the payload.
    pub served_by: String,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> DegradedResponse<T> {
    pub fn full(payload: T, served_by: &str) -> Self {
        Self {
            payload,
            level: DegradationLevel::Full,
            confidence: 1.0,
            served_by: served_by.to_string(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn partial(payload: T, served_by: &str, confidence: f64, warnings: Vec<String>) -> Self {
        Self {
            payload,
            level: DegradationLevel::Partial,
            confidence: confidence.clamp(0.0, 1.0),
            served_by: served_by.to_string(),
            warnings,
            timestamp: Utc::now(),
        }
    }

    pub fn unavailable(payload: T, warnings: Vec<String>) -> Self {
        Self {
            payload,
            level: DegradationLevel::Unavailable,
            confidence: 0.0,
            served_by: "fallback".to_string(),
            warnings,
            timestamp: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.level == DegradationLevel::Full
    }

    /// Whether the payload is substitute text rather than agent output.
    pub fn is_fallback(&self) -> bool {
        self.level == DegradationLevel::Unavailable
    }
}

/// Retry budget and per-call deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
    /// Deadline for one attempt. 0 disables the deadline.
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1000,
            call_timeout_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

/// Which set of substitute sentences fits the turn being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPool {
    /// Neutral holding statements.
    General,
    /// Suspicion-flavoured statements for the game's day discussion.
    DayStatement,
    /// Summary stand-in for the synthesizer.
    Synthesis,
}

impl FallbackPool {
    pub fn phrases(self) -> &'static [&'static str] {
        match self {
            Self::General => &[
                "I need more time to formulate my thoughts.",
                "I'm carefully observing what's happening, but will withhold comments for now.",
                "The situation is developing interestingly. I'm continuing to observe.",
                "I need to think carefully before speaking.",
                "It's difficult to immediately determine the best way forward here.",
            ],
            Self::DayStatement => &[
                "I've noticed some strange behavior in previous discussions. We should pay closer attention.",
                "I find it suspicious how some players change their position between rounds.",
                "Let's think logically - who is too actively accusing others?",
                "I should be careful with my suspicions, but pay attention to these players' behavior.",
                "Interesting dynamics in the discussion. Some players are clearly hiding something.",
            ],
            Self::Synthesis => &[
                "The participants raised several perspectives that still need to be reconciled. \
                 Key points so far should be restated and refined in the next round.",
            ],
        }
    }

    /// Pick one phrase uniformly at random.
    pub fn pick(self) -> &'static str {
        let phrases = self.phrases();
        phrases
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(phrases[0])
    }
}

/// Wraps a client with retry, per-call deadline, and fallback substitution.
#[derive(Clone)]
pub struct ResilientClient {
    client: SharedAgentClient,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(client: SharedAgentClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate text for one turn. Never fails except on cancellation.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        fallback: FallbackPool,
        cancel: &CancellationToken,
    ) -> Result<DegradedResponse<String>, Cancelled> {
        let attempts = self.policy.max_retries + 1;
        let mut warnings = Vec::new();

        for attempt in 0..attempts {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            debug!(
                agent = %request.agent_id,
                attempt,
                prompt_chars = request.prompt.len(),
                "Generating"
            );

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Cancelled),
                r = self.attempt(request) => r,
            };

            match result {
                Ok(text) if !text.trim().is_empty() => {
                    let text = text.trim().to_string();
                    if attempt == 0 {
                        return Ok(DegradedResponse::full(text, self.client.name()));
                    }
                    let confidence = 1.0 - f64::from(attempt) / f64::from(attempts);
                    return Ok(DegradedResponse::partial(
                        text,
                        self.client.name(),
                        confidence,
                        warnings,
                    ));
                }
                Ok(_) => warnings.push(GenerationError::EmptyResponse.to_string()),
                Err(e) => warnings.push(e.to_string()),
            }

            warn!(
                agent = %request.agent_id,
                attempt,
                error = warnings.last().map(String::as_str).unwrap_or_default(),
                "Generation attempt failed"
            );

            if attempt + 1 < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Cancelled),
                    _ = tokio::time::sleep(self.policy.backoff()) => {}
                }
            }
        }

        let text = fallback.pick();
        warn!(agent = %request.agent_id, pool = ?fallback, "Retries exhausted, using fallback text");
        Ok(DegradedResponse::unavailable(text.to_string(), warnings))
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match self.policy.call_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, self.client.generate(request))
                .await
                .map_err(|_| GenerationError::Timeout(deadline))?,
            None => self.client.generate(request).await,
        }
    }
}
