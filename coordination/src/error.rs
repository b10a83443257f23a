//! Error taxonomy shared by both protocols.
//!
//! Only [`ConfigurationError`] is ever surfaced to a caller as a hard failure.
//! Generation and parse failures are absorbed by retry and fallback, and
//! [`ProtocolError::Aborted`] is the pause signal surfacing at a suspension
//! point so the driver can re-enter the phase after resume.

use std::time::Duration;

/// Transport or model failure from an [`crate::client::AgentClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("model failure: {0}")]
    Model(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Agent output that does not match the expected vote or number shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no number found in response")]
    NoNumber,

    #[error("choice {value} is outside 1..={max}")]
    OutOfRange { value: u32, max: usize },

    #[error("agent chose itself")]
    SelfTarget,
}

/// Invalid session configuration. Raised before any protocol state exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("player count {0} is outside the supported range 4..=8")]
    PlayerCount(usize),

    #[error("{mafia} mafia is too many for {players} players (must be fewer than half)")]
    TooManyMafia { mafia: usize, players: usize },

    #[error("{assigned} mafia and special roles leave no civilian among {players} players")]
    NoCivilians { assigned: usize, players: usize },

    #[error("at most {max} {role} allowed, got {count}")]
    TooManyOfRole {
        role: String,
        count: usize,
        max: usize,
    },

    #[error("at least one mafia member is required")]
    NoMafia,

    #[error("max_iterations must be at least 1")]
    InvalidMaxIterations,

    #[error("discussion_rounds must be at least 1")]
    InvalidDiscussionRounds,

    #[error("no enabled discussion agents")]
    NoEnabledAgents,

    #[error("no synthesizer agent registered")]
    MissingSynthesizer,

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("{0} player profiles supplied for {1} players")]
    PlayerProfiles(usize, usize),

    #[error("failed to read config: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// A generation call was cancelled by the session pause signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("generation cancelled by pause")]
pub struct Cancelled;

/// Errors a protocol driver returns from a step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("step aborted during {phase}; partial results discarded")]
    Aborted { phase: String },

    #[error("session already complete")]
    AlreadyComplete,

    #[error("cannot {action} while in {phase}")]
    WrongPhase { action: String, phase: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ProtocolError {
    /// Whether this error is the recoverable pause signal.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Result type for protocol steps.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_messages() {
        let err = ConfigurationError::TooManyMafia {
            mafia: 3,
            players: 6,
        };
        assert_eq!(
            err.to_string(),
            "3 mafia is too many for 6 players (must be fewer than half)"
        );
    }

    #[test]
    fn test_protocol_error_wraps_configuration() {
        let err: ProtocolError = ConfigurationError::NoEnabledAgents.into();
        assert!(!err.is_aborted());
        assert_eq!(err.to_string(), "no enabled discussion agents");

        let aborted = ProtocolError::Aborted {
            phase: "voting".into(),
        };
        assert!(aborted.is_aborted());
    }
}
