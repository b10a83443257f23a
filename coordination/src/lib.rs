//! Agora coordination library
//!
//! Turn orchestration for groups of LLM-backed agents. Two protocols share
//! the same primitives:
//!
//! - [`discussion`]: agents discuss a topic, a synthesizer condenses each
//!   round, and every agent votes on the summary until the configured number
//!   of iterations is accepted.
//! - [`game`]: a hidden-role Mafia game with night actions, day discussion,
//!   elimination votes and win-condition checks.
//!
//! # Turn Data Flow
//!
//! ```text
//! SessionContext / engine state
//!         │ prompt construction
//!         ▼
//! ResilientClient ──▶ AgentClient (retry, per-call deadline, fallback text)
//!         │
//!         ▼
//! aggregator (votes, numeric choices)
//!         │
//!         ▼
//! state mutation ──▶ SessionContext append ──▶ EventBus
//! ```
//!
//! Neither driver calls the other. Both are single-writer: agent calls are
//! the only suspension points and a [`control::PauseControl`] cancels them.

#![allow(clippy::uninlined_format_args)]

pub mod aggregator;
pub mod client;
pub mod config;
pub mod control;
pub mod discussion;
pub mod error;
pub mod events;
pub mod export;
pub mod game;
pub mod registry;
pub mod resilience;
pub mod session;

pub use aggregator::{
    classify_vote, evaluate_consensus, parse_choice, parse_choice_excluding, parse_target_number, parse_vote,
    ConsensusOutcome, UnparsedVotePolicy, Vote, VoteDecision,
};
pub use client::{AgentClient, GenerationParams, GenerationRequest, SharedAgentClient};
pub use config::{Creativity, DiscussionConfig, GameConfig, PlayerProfile, SessionConfig};
pub use control::PauseControl;
pub use discussion::{DiscussionCoordinator, DiscussionPhase};
pub use error::{ConfigurationError, GenerationError, ParseError, ProtocolError, ProtocolResult};
pub use events::{EventBus, SessionEvent, SharedEventBus};
pub use export::{ExportError, ExportFormat, SessionExport};
pub use game::{GameEngine, GamePhase, GameStatus, Player, Role, Winner};
pub use registry::{Agent, AgentRegistry, ParamsUpdate};
pub use resilience::{DegradedResponse, FallbackPool, ResilientClient, RetryPolicy};
pub use session::{SessionContext, Speaker, Transcript, TranscriptEntry};
