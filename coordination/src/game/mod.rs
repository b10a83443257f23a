//! Mafia game: hidden roles, night actions, day discussion, elimination votes
//!
//! # Game Flow
//!
//! ```text
//! Setup ──deal roles──▶ Night ──resolve──▶ [win?] ── yes ──▶ GameOver
//!                        ▲                   │
//!                        │                   no
//!                        │                   ▼
//!                        │                  Day (discussion_rounds × all alive, concurrent)
//!                        │                   │
//!                        │                   ▼
//!                        └──── no ◀─ [win?] ◀─ Voting (strict plurality, ties eliminate nobody)
//!                                      │
//!                                      yes ──▶ GameOver (roles revealed)
//! ```
//!
//! Night collection runs role by role in [`Role::NIGHT_ORDER`]; holders of one
//! role answer concurrently. Unusable answers are re-asked once, then replaced
//! by a heuristic target so every phase completes.

pub mod engine;
pub mod night;
pub mod prompts;
pub mod roles;
pub mod state;
pub mod voting;

pub use engine::GameEngine;
pub use night::{
    build_instructions, resolve_mafia_target, resolve_night, Investigation, NightAction,
    NightInstruction, NightResolution, TargetRef, Tracking,
};
pub use roles::{assign_roles, create_players, Player, Role};
pub use state::{GamePhase, GameStatus, GameTransition, TransitionError, Winner};
pub use voting::{tally, Ballot, VoteTally};
