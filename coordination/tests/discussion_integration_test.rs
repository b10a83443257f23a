//! Discussion integration test: drives the full discuss → summarize → vote
//! loop with scripted agents (no LLM calls).
//!
//! Covers: coordinator ↔ aggregator ↔ session context ↔ pause control ↔
//! event bus ↔ export running together.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_coordination::aggregator::UnparsedVotePolicy;
use agora_coordination::discussion::DiscussionPhase;
use agora_coordination::error::GenerationError;
use agora_coordination::{
    AgentClient, AgentRegistry, DiscussionCoordinator, EventBus, GenerationRequest, SessionConfig, SessionEvent,
    Speaker,
};
use async_trait::async_trait;

const BALLOT_MARKER: &str = "Do you accept this summary?";

fn is_ballot(request: &GenerationRequest) -> bool {
    request.prompt.contains(BALLOT_MARKER)
}

/// Every agent always accepts.
struct AgreeableClient;

#[async_trait]
impl AgentClient for AgreeableClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if is_ballot(request) {
            Ok("I accept this summary".into())
        } else if request.agent_id == "summarizer" {
            Ok("Both agree on protected bike lanes.".into())
        } else {
            Ok(format!("{} argues for protected bike lanes.", request.agent_id))
        }
    }
}

/// Rejects the first `rejections` ballots from `dissenter`, then accepts.
struct DissentingClient {
    dissenter: &'static str,
    rejections: usize,
    seen: AtomicUsize,
}

#[async_trait]
impl AgentClient for DissentingClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if !is_ballot(request) {
            return Ok(format!("{} speaking", request.agent_id));
        }
        if request.agent_id == self.dissenter && self.seen.fetch_add(1, Ordering::SeqCst) < self.rejections {
            return Ok("I reject this summary, it ignores costs.".into());
        }
        Ok("I accept this summary".into())
    }
}

/// `network2` answers ballots with something that is neither yes nor no.
struct NoncommittalClient;

#[async_trait]
impl AgentClient for NoncommittalClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match (is_ballot(request), request.agent_id.as_str()) {
            (true, "network2") => Ok("Hmm, interesting framing.".into()),
            (true, _) => Ok("I accept this summary".into()),
            (false, id) => Ok(format!("{} speaking", id)),
        }
    }
}

/// First call hangs for a minute; every later call answers at once.
struct StallingClient {
    stalled: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl AgentClient for StallingClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if is_ballot(request) {
            Ok("I accept this summary".into())
        } else {
            Ok(format!("{} speaking", request.agent_id))
        }
    }
}

fn mock_config(max_iterations: u32) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.discussion.topic_name = "Bike lanes".into();
    config.discussion.topic_description = "Should the city build protected bike lanes?".into();
    config.discussion.max_iterations = max_iterations;
    config.retry.backoff_ms = 0;
    config
}

fn mock_coordinator(config: &SessionConfig, client: Arc<dyn AgentClient>) -> DiscussionCoordinator {
    DiscussionCoordinator::new(config, AgentRegistry::with_default_roster(), client).unwrap()
}

// ── Happy path: every vote accepts ─────────────────────────────────

#[tokio::test]
async fn test_three_accepted_iterations_reach_finalizing() {
    let mut coordinator = mock_coordinator(&mock_config(3), Arc::new(AgreeableClient));
    assert_eq!(coordinator.registry().discussion_order().len(), 2);

    coordinator.start().unwrap();
    while coordinator.phase() != DiscussionPhase::Finalizing {
        coordinator.step().await.unwrap();
    }

    assert_eq!(coordinator.accumulated_summaries().len(), 3);
    assert_eq!(coordinator.state().iteration, 3);
    assert!(coordinator.records().iter().all(|r| r.accepted && !r.forced));
    assert!(coordinator.round().is_empty());

    assert_eq!(coordinator.step().await.unwrap(), DiscussionPhase::Completed);
    assert!(coordinator.final_output().is_some());
}

#[tokio::test]
async fn test_iteration_indices_strictly_increase() {
    let mut coordinator = mock_coordinator(&mock_config(3), Arc::new(AgreeableClient));
    coordinator.run().await.unwrap();

    let iterations: Vec<u32> = coordinator.records().iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3]);
}

// ── Rejection restarts the same iteration ──────────────────────────

#[tokio::test]
async fn test_single_reject_restarts_iteration() {
    let client = Arc::new(DissentingClient {
        dissenter: "network2",
        rejections: 1,
        seen: AtomicUsize::new(0),
    });
    let mut coordinator = mock_coordinator(&mock_config(2), client);
    coordinator.start().unwrap();

    coordinator.step().await.unwrap();
    coordinator.step().await.unwrap();
    let next = coordinator.step().await.unwrap();

    assert_eq!(next, DiscussionPhase::Discussing);
    assert!(coordinator.accumulated_summaries().is_empty());
    assert_eq!(coordinator.state().current_iteration(), 1);
    assert_eq!(coordinator.state().consecutive_rejections, 1);
    assert!(!coordinator.records()[0].accepted);
    assert!(coordinator.candidate_summary().is_none());

    // The rejecting ballot stays on the public record.
    let transcript = coordinator.context().transcript();
    assert!(transcript
        .entries()
        .iter()
        .any(|e| e.content.contains("it ignores costs")));

    coordinator.run().await.unwrap();
    assert_eq!(coordinator.accumulated_summaries().len(), 2);
    assert_eq!(coordinator.records().len(), 3);
}

#[tokio::test]
async fn test_rejection_limit_forces_acceptance() {
    let mut config = mock_config(1);
    config.discussion.max_consecutive_rejections = 2;
    let client = Arc::new(DissentingClient {
        dissenter: "network1",
        rejections: usize::MAX,
        seen: AtomicUsize::new(0),
    });
    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let mut coordinator = mock_coordinator(&config, client).with_events(Arc::clone(&bus));

    coordinator.run().await.unwrap();

    assert_eq!(coordinator.accumulated_summaries().len(), 1);
    let last = coordinator.records().last().unwrap();
    assert!(last.forced);
    assert!(last.accepted);
    assert_eq!(last.attempt, 2);

    let mut forced_events = 0;
    let mut rejected_events = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::SummaryAccepted { forced, .. } => {
                assert!(forced);
                forced_events += 1;
            }
            SessionEvent::SummaryRejected { .. } => rejected_events += 1,
            _ => {}
        }
    }
    assert_eq!(forced_events, 1);
    assert_eq!(rejected_events, 1);
}

// ── Unparsed ballots ───────────────────────────────────────────────

#[tokio::test]
async fn test_unparsed_ballot_rejects_by_default() {
    let mut config = mock_config(1);
    config.discussion.max_consecutive_rejections = 0;
    let mut coordinator = mock_coordinator(&config, Arc::new(NoncommittalClient));
    coordinator.start().unwrap();
    for _ in 0..3 {
        coordinator.step().await.unwrap();
    }
    assert_eq!(coordinator.phase(), DiscussionPhase::Discussing);
    assert!(coordinator.accumulated_summaries().is_empty());
}

#[tokio::test]
async fn test_unparsed_ballot_abstains_when_configured() {
    let mut config = mock_config(1);
    config.discussion.unparsed_votes = UnparsedVotePolicy::Abstain;
    let mut coordinator = mock_coordinator(&config, Arc::new(NoncommittalClient));
    coordinator.start().unwrap();
    for _ in 0..3 {
        coordinator.step().await.unwrap();
    }
    assert_eq!(coordinator.phase(), DiscussionPhase::Finalizing);
    assert_eq!(coordinator.accumulated_summaries().len(), 1);
}

// ── Pause, resume, interjection ────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_pause_discards_round_and_resume_splices_interjection() {
    let client = Arc::new(StallingClient {
        stalled: AtomicBool::new(false),
        prompts: Mutex::new(Vec::new()),
    });
    let mut coordinator = mock_coordinator(&mock_config(1), client.clone());
    let control = coordinator.control();
    coordinator.start().unwrap();

    let pauser = tokio::spawn({
        let control = control.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            control.pause();
        }
    });
    let err = coordinator.step().await.unwrap_err();
    pauser.await.unwrap();

    assert!(err.is_aborted());
    assert_eq!(coordinator.phase(), DiscussionPhase::Discussing);
    assert!(coordinator.round().is_empty());

    control.resume(Some("Please consider winter maintenance costs.".into()));
    assert_eq!(coordinator.step().await.unwrap(), DiscussionPhase::Summarizing);

    let first = &coordinator.round()[0];
    assert!(first.agent_id.is_none());
    assert_eq!(first.content, "Please consider winter maintenance costs.");
    assert!(coordinator
        .context()
        .transcript()
        .entries()
        .iter()
        .any(|e| e.speaker == Speaker::User));

    let prompts = client.prompts.lock().unwrap();
    assert!(prompts.last().unwrap().contains("winter maintenance"));
}

// ── Events and export ──────────────────────────────────────────────

#[tokio::test]
async fn test_events_follow_phase_changes() {
    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let mut coordinator = mock_coordinator(&mock_config(1), Arc::new(AgreeableClient)).with_events(Arc::clone(&bus));
    coordinator.run().await.unwrap();

    let mut phases = Vec::new();
    let mut messages = 0;
    let mut sessions = HashSet::new();
    while let Ok(event) = events.try_recv() {
        sessions.insert(event.session_id().to_string());
        match event {
            SessionEvent::PhaseChanged { to, .. } => phases.push(to),
            SessionEvent::MessageAppended { .. } => messages += 1,
            _ => {}
        }
    }
    assert_eq!(phases, vec!["discussing", "summarizing", "voting", "finalizing", "completed"]);
    assert_eq!(messages, coordinator.context().transcript().len());
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn test_export_after_completion() {
    let mut coordinator = mock_coordinator(&mock_config(2), Arc::new(AgreeableClient));
    coordinator.run().await.unwrap();

    let export = coordinator.export();
    assert_eq!(export.project_name, "Bike lanes");
    assert_eq!(export.accepted_summaries.len(), 2);
    assert_eq!(export.messages.len(), coordinator.context().transcript().len());
    assert!(export.final_output.is_some());
    assert!(export.to_text().contains("Accepted Summaries:\n1. Both agree on protected bike lanes."));
}
