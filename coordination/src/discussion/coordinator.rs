//! Discussion coordinator: drives the discuss → summarize → vote loop.
//!
//! The coordinator owns all mutable session state and is the only writer to
//! it. Agent calls are the only suspension points; each phase either runs to
//! completion or, when the pause signal fires, returns
//! [`ProtocolError::Aborted`] after discarding what it collected.

use futures::future::join_all;
use tracing::{info, warn};

use crate::aggregator::{evaluate_consensus, Vote, VoteDecision};
use crate::client::{GenerationRequest, SharedAgentClient};
use crate::config::{DiscussionConfig, SessionConfig};
use crate::control::PauseControl;
use crate::error::{Cancelled, ConfigurationError, ProtocolError, ProtocolResult};
use crate::events::{SessionEvent, SharedEventBus};
use crate::export::SessionExport;
use crate::registry::{Agent, AgentRegistry};
use crate::resilience::{FallbackPool, ResilientClient};
use crate::session::{SessionContext, Speaker};

use super::prompts;
use super::state::{DiscussionPhase, DiscussionState, IterationRecord, RoundMessage};

/// Drives one discussion session.
pub struct DiscussionCoordinator {
    config: DiscussionConfig,
    unrestricted_mode: bool,
    registry: AgentRegistry,
    client: ResilientClient,
    control: PauseControl,
    context: SessionContext,
    state: DiscussionState,
    round: Vec<RoundMessage>,
    candidate: Option<String>,
    rejection_feedback: Option<String>,
    final_output: Option<String>,
}

impl DiscussionCoordinator {
    /// Validate configuration and build an idle coordinator.
    pub fn new(
        config: &SessionConfig,
        registry: AgentRegistry,
        client: SharedAgentClient,
    ) -> Result<Self, ConfigurationError> {
        config.discussion.validate()?;
        registry.validate()?;
        Ok(Self {
            config: config.discussion.clone(),
            unrestricted_mode: config.unrestricted_mode,
            registry,
            client: ResilientClient::new(client, config.retry.clone()),
            control: PauseControl::new(),
            context: SessionContext::new(),
            state: DiscussionState::new(config.discussion.max_iterations),
            round: Vec::new(),
            candidate: None,
            rejection_feedback: None,
            final_output: None,
        })
    }

    /// Publish session events to `bus`.
    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.context = std::mem::take(&mut self.context).with_events(bus);
        self
    }

    /// Share an existing pause handle.
    pub fn with_control(mut self, control: PauseControl) -> Self {
        self.control = control;
        self
    }

    /// Pause handle for this session.
    pub fn control(&self) -> PauseControl {
        self.control.clone()
    }

    pub fn phase(&self) -> DiscussionPhase {
        self.state.phase
    }

    pub fn state(&self) -> &DiscussionState {
        &self.state
    }

    pub fn accumulated_summaries(&self) -> &[String] {
        &self.state.accumulated_summaries
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.state.records
    }

    /// Candidate summary awaiting votes.
    pub fn candidate_summary(&self) -> Option<&str> {
        self.candidate.as_deref()
    }

    /// Messages of the round in progress.
    pub fn round(&self) -> &[RoundMessage] {
        &self.round
    }

    pub fn final_output(&self) -> Option<&str> {
        self.final_output.as_deref()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn config(&self) -> &DiscussionConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Settings changes take effect from the next step.
    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// Idle → Discussing.
    pub fn start(&mut self) -> ProtocolResult<()> {
        if self.state.phase != DiscussionPhase::Idle {
            return Err(self.wrong_phase("start"));
        }
        info!(
            session_id = %self.context.session_id,
            topic = %self.config.topic_name,
            max_iterations = self.state.max_iterations,
            "Starting discussion"
        );
        self.transition(DiscussionPhase::Discussing, "discussion started")
    }

    /// Run the current phase once and return the phase entered afterwards.
    pub async fn step(&mut self) -> ProtocolResult<DiscussionPhase> {
        if self.control.is_paused() {
            return Err(self.aborted());
        }
        self.registry.validate()?;
        self.absorb_interjections();

        match self.state.phase {
            DiscussionPhase::Idle => self.start()?,
            DiscussionPhase::Discussing => self.discuss().await?,
            DiscussionPhase::Summarizing => self.summarize().await?,
            DiscussionPhase::Voting => self.vote().await?,
            DiscussionPhase::Finalizing => self.finalize().await?,
            DiscussionPhase::Completed => return Err(ProtocolError::AlreadyComplete),
        }
        Ok(self.state.phase)
    }

    /// Step until `Completed`, waiting out pauses.
    pub async fn run(&mut self) -> ProtocolResult<()> {
        while !self.state.is_complete() {
            match self.step().await {
                Ok(_) => {}
                Err(e) if e.is_aborted() => {
                    info!(phase = %self.state.phase, "Discussion paused, waiting for resume");
                    self.control.wait_resumed().await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Continue a completed discussion for `additional` more iterations. The
    /// final artifact is regenerated when they finish.
    pub fn extend(&mut self, additional: u32) -> ProtocolResult<()> {
        if self.state.phase != DiscussionPhase::Completed {
            return Err(self.wrong_phase("extend"));
        }
        if additional == 0 {
            return Err(ConfigurationError::InvalidMaxIterations.into());
        }
        self.state.max_iterations += additional;
        self.final_output = None;
        self.transition(DiscussionPhase::Discussing, "continued after completion")
    }

    /// Back to `Idle`, dropping all discussion content. Configuration and
    /// agent settings are kept.
    pub fn reset(&mut self) {
        info!(session_id = %self.context.session_id, "Resetting discussion");
        self.state = DiscussionState::new(self.config.max_iterations);
        self.round.clear();
        self.candidate = None;
        self.rejection_feedback = None;
        self.final_output = None;
        self.context.clear();
    }

    /// Format-agnostic snapshot for export.
    pub fn export(&self) -> SessionExport {
        SessionExport::new(
            &self.config.topic_name,
            &self.config.topic_description,
            self.state.accumulated_summaries.clone(),
            self.final_output.clone(),
            self.context.transcript(),
        )
    }

    async fn discuss(&mut self) -> ProtocolResult<()> {
        let cancel = self.control.token();
        let rollback_len = self.round.len();
        let order: Vec<Agent> = self.registry.discussion_order().into_iter().cloned().collect();
        let passes = 1 + self.config.exchange_rounds;

        for pass in 0..passes {
            for agent in &order {
                let context = prompts::discussion_context(
                    &self.config,
                    &self.state.accumulated_summaries,
                    &self.round,
                    self.rejection_feedback.as_deref(),
                );
                let opening = self.round.iter().all(|m| m.agent_id.is_none());
                let request = GenerationRequest::new(
                    &agent.id,
                    agent.system_prompt(self.unrestricted_mode),
                    prompts::turn_prompt(agent, &context, opening),
                    agent.params.clone(),
                );

                let response = match self.client.generate(&request, FallbackPool::General, &cancel).await {
                    Ok(response) => response,
                    Err(Cancelled) => {
                        self.round.truncate(rollback_len);
                        return Err(self.aborted());
                    }
                };

                info!(
                    agent = %agent.id,
                    pass,
                    iteration = self.state.current_iteration(),
                    level = %response.level,
                    "Discussion turn"
                );
                self.round.push(RoundMessage {
                    agent_id: Some(agent.id.clone()),
                    display_name: agent.display_name.clone(),
                    content: response.payload.clone(),
                });
                self.context.append(
                    Speaker::agent(&agent.id),
                    &agent.display_name,
                    &response.payload,
                    response.is_fallback(),
                );
            }
        }

        self.transition(DiscussionPhase::Summarizing, "round complete")
    }

    async fn summarize(&mut self) -> ProtocolResult<()> {
        let cancel = self.control.token();
        let synthesizer = self.synthesizer()?;
        let context = prompts::discussion_context(&self.config, &self.state.accumulated_summaries, &self.round, None);
        let request = GenerationRequest::new(
            &synthesizer.id,
            prompts::summary_system_prompt(&synthesizer, self.unrestricted_mode, &self.config.synthesizer_instructions),
            format!("{}\nSummarize the current discussion.", context),
            synthesizer.params.clone(),
        );

        let response = self
            .client
            .generate(&request, FallbackPool::Synthesis, &cancel)
            .await
            .map_err(|_| self.aborted())?;

        self.context.append(
            Speaker::agent(&synthesizer.id),
            &synthesizer.display_name,
            &response.payload,
            response.is_fallback(),
        );
        self.candidate = Some(response.payload);
        self.transition(DiscussionPhase::Voting, "candidate summary ready")
    }

    async fn vote(&mut self) -> ProtocolResult<()> {
        let summary = match &self.candidate {
            Some(summary) => summary.clone(),
            None => return Err(self.wrong_phase("vote without a candidate summary")),
        };
        let cancel = self.control.token();
        let voters: Vec<Agent> = self.registry.discussion_order().into_iter().cloned().collect();

        let client = &self.client;
        let cancel = &cancel;
        let ballots = join_all(voters.iter().map(|agent| {
            let request = GenerationRequest::new(
                &agent.id,
                agent.system_prompt(self.unrestricted_mode),
                prompts::vote_prompt(agent, &self.round, &summary),
                agent.params.for_ballot(),
            );
            async move { client.generate(&request, FallbackPool::General, cancel).await }
        }))
        .await;

        let mut responses = Vec::with_capacity(ballots.len());
        for ballot in ballots {
            match ballot {
                Ok(response) => responses.push(response),
                Err(Cancelled) => return Err(self.aborted()),
            }
        }

        let votes: Vec<Vote> = voters
            .iter()
            .zip(&responses)
            .map(|(agent, response)| Vote::new(&agent.id, &response.payload))
            .collect();
        for ((agent, response), vote) in voters.iter().zip(&responses).zip(&votes) {
            if vote.decision == VoteDecision::Unparsed {
                warn!(agent = %agent.id, "Ballot matched neither vocabulary");
            }
            self.context.append(
                Speaker::agent(&agent.id),
                &agent.display_name,
                &response.payload,
                response.is_fallback(),
            );
        }

        let outcome = evaluate_consensus(&votes, self.config.unparsed_votes);
        let iteration = self.state.current_iteration();
        let attempt = self.state.consecutive_rejections + 1;
        info!(
            iteration,
            attempt,
            accepts = outcome.accepts,
            rejects = outcome.rejects,
            unparsed = outcome.unparsed,
            accepted = outcome.accepted,
            "Votes tallied"
        );

        let forced = !outcome.accepted && self.state.reject(self.config.max_consecutive_rejections);
        if forced {
            warn!(
                iteration,
                rejections = self.state.consecutive_rejections,
                "Rejection limit reached, force-accepting summary"
            );
        }

        self.state.records.push(IterationRecord {
            iteration,
            attempt,
            summary: summary.clone(),
            votes: votes.clone(),
            accepted: outcome.accepted || forced,
            forced,
            decided_at: chrono::Utc::now(),
        });
        self.round.clear();
        self.candidate = None;

        if outcome.accepted || forced {
            self.rejection_feedback = None;
            let next = self.state.accept(summary.clone());
            self.context.publish(SessionEvent::SummaryAccepted {
                session_id: self.context.session_id.clone(),
                iteration,
                summary,
                forced,
                timestamp: chrono::Utc::now(),
            });
            let reason = if forced {
                "summary force-accepted after repeated rejection"
            } else {
                "summary accepted unanimously"
            };
            self.transition(next, reason)
        } else {
            self.rejection_feedback = Some(
                voters
                    .iter()
                    .zip(&votes)
                    .filter(|(_, v)| v.decision != VoteDecision::Accept)
                    .map(|(agent, v)| format!("{}: {}", agent.display_name, v.raw))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
            self.context.publish(SessionEvent::SummaryRejected {
                session_id: self.context.session_id.clone(),
                iteration,
                rejections: self.state.consecutive_rejections as usize,
                timestamp: chrono::Utc::now(),
            });
            self.transition(DiscussionPhase::Discussing, "summary rejected")
        }
    }

    async fn finalize(&mut self) -> ProtocolResult<()> {
        let cancel = self.control.token();
        let synthesizer = self.synthesizer()?;
        let request = GenerationRequest::new(
            &synthesizer.id,
            prompts::final_output_system_prompt(&synthesizer, self.unrestricted_mode),
            prompts::final_output_prompt(&self.config, &self.state.accumulated_summaries),
            synthesizer.params.for_final_output(),
        );

        let response = self
            .client
            .generate(&request, FallbackPool::Synthesis, &cancel)
            .await
            .map_err(|_| self.aborted())?;

        self.context.append(
            Speaker::agent(&synthesizer.id),
            &synthesizer.display_name,
            &response.payload,
            response.is_fallback(),
        );
        self.final_output = Some(response.payload);
        self.transition(DiscussionPhase::Completed, "final output produced")
    }

    fn synthesizer(&self) -> Result<Agent, ConfigurationError> {
        self.registry
            .synthesizer()
            .cloned()
            .ok_or(ConfigurationError::MissingSynthesizer)
    }

    fn absorb_interjections(&mut self) {
        for text in self.control.take_interjections() {
            info!(phase = %self.state.phase, "User interjection spliced into context");
            self.round.push(RoundMessage {
                agent_id: None,
                display_name: "User".to_string(),
                content: text.clone(),
            });
            self.context.append(Speaker::User, "User", &text, false);
        }
    }

    fn transition(&mut self, to: DiscussionPhase, reason: &str) -> ProtocolResult<()> {
        let from = self.state.phase;
        self.state.transition(to, reason)?;
        info!(
            session_id = %self.context.session_id,
            from = %from,
            to = %to,
            reason,
            status = %self.state.status_line(),
            "Discussion phase transition"
        );
        self.context.publish(SessionEvent::PhaseChanged {
            session_id: self.context.session_id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    fn aborted(&self) -> ProtocolError {
        info!(phase = %self.state.phase, "Step aborted by pause");
        ProtocolError::Aborted {
            phase: self.state.phase.to_string(),
        }
    }

    fn wrong_phase(&self, action: &str) -> ProtocolError {
        ProtocolError::WrongPhase {
            action: action.to_string(),
            phase: self.state.phase.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::client::AgentClient;
    use crate::error::GenerationError;

    /// Replies "I accept this summary" to ballots and a canned line otherwise.
    struct AgreeableClient;

    #[async_trait]
    impl AgentClient for AgreeableClient {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            if request.prompt.contains("Do you accept this summary?") {
                Ok("I accept this summary".into())
            } else {
                Ok(format!("{} speaking", request.agent_id))
            }
        }
    }

    fn mock_coordinator(max_iterations: u32) -> DiscussionCoordinator {
        let mut config = SessionConfig::default();
        config.discussion.max_iterations = max_iterations;
        config.discussion.topic_name = "Test topic".into();
        DiscussionCoordinator::new(&config, AgentRegistry::with_default_roster(), Arc::new(AgreeableClient)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = SessionConfig::default();
        config.discussion.max_iterations = 0;
        let err = DiscussionCoordinator::new(&config, AgentRegistry::with_default_roster(), Arc::new(AgreeableClient))
            .err()
            .unwrap();
        assert_eq!(err, ConfigurationError::InvalidMaxIterations);

        let err = DiscussionCoordinator::new(&SessionConfig::default(), AgentRegistry::new(), Arc::new(AgreeableClient))
            .err()
            .unwrap();
        assert_eq!(err, ConfigurationError::MissingSynthesizer);
    }

    #[tokio::test]
    async fn test_discuss_runs_exchange_rounds() {
        let mut coordinator = mock_coordinator(1);
        coordinator.start().unwrap();
        let next = coordinator.step().await.unwrap();

        assert_eq!(next, DiscussionPhase::Summarizing);
        let speakers: Vec<_> = coordinator.round().iter().filter_map(|m| m.agent_id.as_deref()).collect();
        assert_eq!(speakers, vec!["network1", "network2", "network1", "network2"]);
        assert_eq!(coordinator.context().transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_step_out_of_order_is_rejected() {
        let mut coordinator = mock_coordinator(1);
        coordinator.run().await.unwrap();
        assert_eq!(coordinator.step().await.unwrap_err(), ProtocolError::AlreadyComplete);
        assert!(coordinator.start().is_err());
    }

    #[tokio::test]
    async fn test_extend_after_completion() {
        let mut coordinator = mock_coordinator(1);
        coordinator.run().await.unwrap();
        assert_eq!(coordinator.accumulated_summaries().len(), 1);

        coordinator.extend(2).unwrap();
        assert!(coordinator.final_output().is_none());
        coordinator.run().await.unwrap();
        assert_eq!(coordinator.accumulated_summaries().len(), 3);
        assert!(coordinator.final_output().is_some());
    }

    #[tokio::test]
    async fn test_reset_preserves_settings() {
        let mut coordinator = mock_coordinator(1);
        coordinator.registry_mut().set_enabled("network3", true).unwrap();
        coordinator.run().await.unwrap();

        coordinator.reset();
        assert_eq!(coordinator.phase(), DiscussionPhase::Idle);
        assert!(coordinator.accumulated_summaries().is_empty());
        assert!(coordinator.context().transcript().is_empty());
        assert!(coordinator.final_output().is_none());
        assert_eq!(coordinator.registry().discussion_order().len(), 3);
    }

    #[tokio::test]
    async fn test_paused_step_is_aborted() {
        let mut coordinator = mock_coordinator(1);
        coordinator.start().unwrap();
        coordinator.control().pause();

        let err = coordinator.step().await.unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(coordinator.phase(), DiscussionPhase::Discussing);
        assert!(coordinator.round().is_empty());
    }
}
