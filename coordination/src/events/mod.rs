//! Session events: pub/sub for renderers and observers
//!
//! Protocol drivers publish every externally visible change (phase moves,
//! transcript appends, accepted summaries, eliminations, game over) so a
//! renderer can follow a session without reading state back out of it.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Driver    │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Publishing never blocks and never fails when nobody is listening.
//! Slow subscribers lose the oldest events (broadcast lag semantics).

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::SessionEvent;
