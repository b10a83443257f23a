//! Discussion state machine: phases, transitions, and iteration tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::Vote;
use crate::error::ProtocolError;

/// Phase of a discussion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscussionPhase {
    /// Configured but not started.
    Idle,
    /// Agents are taking turns on the topic.
    Discussing,
    /// Synthesizer is condensing the round.
    Summarizing,
    /// Agents are voting on the candidate summary.
    Voting,
    /// Synthesizer is composing the final artifact.
    Finalizing,
    /// Final artifact produced.
    Completed,
}

impl DiscussionPhase {
    /// Whether this is a terminal phase. `Completed` can still be extended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DiscussionPhase] {
        match self {
            Self::Idle => &[Self::Discussing],
            Self::Discussing => &[Self::Summarizing],
            Self::Summarizing => &[Self::Voting],
            Self::Voting => &[Self::Discussing, Self::Finalizing],
            Self::Finalizing => &[Self::Completed],
            Self::Completed => &[Self::Discussing],
        }
    }
}

impl std::fmt::Display for DiscussionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Discussing => write!(f, "discussing"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Voting => write!(f, "voting"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionTransition {
    pub from: DiscussionPhase,
    pub to: DiscussionPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DiscussionPhase,
    pub to: DiscussionPhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transition {} → {}: {}", self.from, self.to, self.reason)
    }
}

impl std::error::Error for TransitionError {}

impl From<TransitionError> for ProtocolError {
    fn from(err: TransitionError) -> Self {
        ProtocolError::InvalidTransition(err.to_string())
    }
}

/// One message in the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundMessage {
    /// `None` for user interjections.
    pub agent_id: Option<String>,
    pub display_name: String,
    pub content: String,
}

/// Outcome of one summarize-and-vote attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration the attempt belongs to (1-indexed).
    pub iteration: u32,
    /// Attempt number within the iteration (1-indexed).
    pub attempt: u32,
    pub summary: String,
    pub votes: Vec<Vote>,
    pub accepted: bool,
    /// Accepted because the rejection limit was reached.
    pub forced: bool,
    pub decided_at: DateTime<Utc>,
}

/// Pure state of a discussion session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionState {
    pub phase: DiscussionPhase,
    /// Accepted iterations so far.
    pub iteration: u32,
    pub max_iterations: u32,
    pub accumulated_summaries: Vec<String>,
    pub records: Vec<IterationRecord>,
    /// Rejections of the current iteration since its last acceptance.
    pub consecutive_rejections: u32,
    pub transitions: Vec<DiscussionTransition>,
}

impl DiscussionState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            phase: DiscussionPhase::Idle,
            iteration: 0,
            max_iterations,
            accumulated_summaries: Vec::new(),
            records: Vec::new(),
            consecutive_rejections: 0,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DiscussionPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }
        self.transitions.push(DiscussionTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Record an accepted summary and return the next phase.
    pub fn accept(&mut self, summary: String) -> DiscussionPhase {
        self.accumulated_summaries.push(summary);
        self.iteration += 1;
        self.consecutive_rejections = 0;
        self.next_after_accept()
    }

    /// Count a rejection. Returns true when the rejection limit is now reached.
    pub fn reject(&mut self, limit: u32) -> bool {
        self.consecutive_rejections += 1;
        limit > 0 && self.consecutive_rejections >= limit
    }

    pub fn next_after_accept(&self) -> DiscussionPhase {
        if self.iteration < self.max_iterations {
            DiscussionPhase::Discussing
        } else {
            DiscussionPhase::Finalizing
        }
    }

    /// 1-indexed number of the iteration in progress.
    pub fn current_iteration(&self) -> u32 {
        self.iteration + 1
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] iteration {}/{} | {} summaries accepted | {} consecutive rejections",
            self.phase,
            self.iteration,
            self.max_iterations,
            self.accumulated_summaries.len(),
            self.consecutive_rejections
        )
    }
}
