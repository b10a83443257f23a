//! Session-wide pause and resume.
//!
//! ```text
//!  running ──pause()──▶ paused ──resume(msg?)──▶ running
//!     │                   │
//!     │  token cancelled: in-flight generations abort with `Cancelled`
//!     │                   └─ driver waits in `wait_resumed()`
//!     └─ fresh token handed out after every resume
//! ```
//!
//! A resume may carry a user interjection. Drivers drain interjections at the
//! start of the next step and splice them into the context before the
//! interrupted phase is re-entered.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
struct PauseState {
    paused: bool,
    token: CancellationToken,
    interjections: Vec<String>,
}

/// Cloneable pause handle shared between a driver and whoever controls it.
#[derive(Debug, Clone)]
pub struct PauseControl {
    state: Arc<watch::Sender<PauseState>>,
}

impl PauseControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PauseState {
            paused: false,
            token: CancellationToken::new(),
            interjections: Vec::new(),
        });
        Self { state: Arc::new(tx) }
    }

    /// Pause the session and cancel every in-flight generation.
    pub fn pause(&self) {
        self.state.send_modify(|s| {
            if !s.paused {
                s.paused = true;
                s.token.cancel();
            }
        });
        info!("Session paused");
    }

    /// Resume the session, optionally queueing a user message.
    pub fn resume(&self, interjection: Option<String>) {
        self.state.send_modify(|s| {
            if let Some(text) = interjection.filter(|t| !t.trim().is_empty()) {
                s.interjections.push(text);
            }
            if s.paused {
                s.paused = false;
                s.token = CancellationToken::new();
            }
        });
        info!("Session resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Token for the current run. Cancelled by the next `pause()`.
    pub fn token(&self) -> CancellationToken {
        self.state.borrow().token.clone()
    }

    /// Wait until the session is not paused.
    pub async fn wait_resumed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| !s.paused).await;
    }

    /// Drain queued user interjections, oldest first.
    pub fn take_interjections(&self) -> Vec<String> {
        let mut taken = Vec::new();
        self.state.send_if_modified(|s| {
            taken = std::mem::take(&mut s.interjections);
            !taken.is_empty()
        });
        taken
    }
}

impl Default for PauseControl {
    fn default() -> Self {
        Self::new()
    }
}
