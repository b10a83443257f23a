//! Event types published by the protocol drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Speaker;

/// All externally visible session changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A protocol moved between phases.
    PhaseChanged {
        session_id: String,
        from: String,
        to: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was appended to the public transcript.
    MessageAppended {
        session_id: String,
        seq: u64,
        speaker: Speaker,
        display_name: String,
        content: String,
        /// Whether the content is fallback text.
        fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// A candidate summary was accepted.
    SummaryAccepted {
        session_id: String,
        iteration: u32,
        summary: String,
        forced: bool,
        timestamp: DateTime<Utc>,
    },

    /// A candidate summary was rejected.
    SummaryRejected {
        session_id: String,
        iteration: u32,
        rejections: usize,
        timestamp: DateTime<Utc>,
    },

    /// A player died at night or was voted out.
    PlayerEliminated {
        session_id: String,
        player_id: String,
        player_name: String,
        /// Role, revealed only for day eliminations.
        revealed_role: Option<String>,
        day: u32,
        timestamp: DateTime<Utc>,
    },

    /// The game reached a terminal status.
    GameOver {
        session_id: String,
        winner: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "phase_changed",
            Self::MessageAppended { .. } => "message_appended",
            Self::SummaryAccepted { .. } => "summary_accepted",
            Self::SummaryRejected { .. } => "summary_rejected",
            Self::PlayerEliminated { .. } => "player_eliminated",
            Self::GameOver { .. } => "game_over",
        }
    }

    /// Get the session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            Self::PhaseChanged { session_id, .. }
            | Self::MessageAppended { session_id, .. }
            | Self::SummaryAccepted { session_id, .. }
            | Self::SummaryRejected { session_id, .. }
            | Self::PlayerEliminated { session_id, .. }
            | Self::GameOver { session_id, .. } => session_id,
        }
    }

    /// Get the event timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PhaseChanged { timestamp, .. }
            | Self::MessageAppended { timestamp, .. }
            | Self::SummaryAccepted { timestamp, .. }
            | Self::SummaryRejected { timestamp, .. }
            | Self::PlayerEliminated { timestamp, .. }
            | Self::GameOver { timestamp, .. } => *timestamp,
        }
    }
}
