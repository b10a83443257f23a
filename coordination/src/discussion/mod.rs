//! Discussion and consensus: iterative discuss, summarize, vote loop
//!
//! Enabled agents discuss a topic in a fixed speaking order, the synthesizer
//! condenses the round into a candidate summary, and every discussion agent
//! votes on it. Acceptance is unanimous.
//!
//! # Discussion Flow
//!
//! ```text
//! Idle → Discussing → Summarizing → Voting → [unanimous?]
//!           ▲                                   │
//!           │                                   ├─ Yes, iterations left → Discussing
//!           └──── No (same iteration) ──────────┤
//!                                               └─ Yes, last iteration → Finalizing → Completed
//!
//! Completed ──extend(n)──▶ Discussing
//! any phase ──pause──▶ step aborted, phase re-entered fresh on resume
//! ```
//!
//! Raw discussion is cleared after every vote; accepted summaries carry
//! forward as context. Repeated rejection of the same iteration is bounded by
//! `max_consecutive_rejections`, after which the candidate is force-accepted.

pub mod coordinator;
pub mod prompts;
pub mod state;

pub use coordinator::DiscussionCoordinator;
pub use state::{
    DiscussionPhase, DiscussionState, DiscussionTransition, IterationRecord, RoundMessage,
    TransitionError,
};
