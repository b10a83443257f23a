//! Game engine: drives Setup → Night → Day → Voting → (Night | GameOver).
//!
//! The engine owns the roster and is the only writer to it. Within a night,
//! roles are collected one after another in [`Role::NIGHT_ORDER`] and every
//! holder of the same role is queried concurrently. Nothing is committed
//! until the whole night has been collected, so a pause mid-night discards
//! the partial collection and the night is replayed on resume.

use std::collections::HashSet;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::parse_choice_excluding;
use crate::client::{GenerationRequest, SharedAgentClient};
use crate::config::{GameConfig, SessionConfig};
use crate::control::PauseControl;
use crate::error::{Cancelled, ConfigurationError, ParseError, ProtocolError, ProtocolResult};
use crate::events::{SessionEvent, SharedEventBus};
use crate::export::SessionExport;
use crate::resilience::{FallbackPool, ResilientClient};
use crate::session::{SessionContext, Speaker};

use super::night::{build_instructions, resolve_night, NightAction, NightInstruction, NightResolution, TargetRef};
use super::prompts::{self, Table};
use super::roles::{create_players, Player, Role};
use super::state::{GamePhase, GameStatus, GameTransition, TransitionError};
use super::voting::{tally, Ballot, VoteTally};

/// Parsed answer to a numbered-choice prompt.
struct Choice {
    /// 0-based option index, or why the last attempt was unusable.
    outcome: Result<usize, ParseError>,
    raw: String,
}

/// Ask once, and once more with a stricter instruction if the answer is not
/// a valid option number. Naming `own` is final and never re-prompted.
async fn choose_target(
    client: &ResilientClient,
    mut request: GenerationRequest,
    options: usize,
    own: Option<usize>,
    cancel: &CancellationToken,
) -> Result<Choice, Cancelled> {
    let first = client.generate(&request, FallbackPool::General, cancel).await?;
    match parse_choice_excluding(&first.payload, options, own) {
        Err(ParseError::NoNumber) | Err(ParseError::OutOfRange { .. }) => {}
        outcome => {
            return Ok(Choice {
                outcome,
                raw: first.payload,
            })
        }
    }
    debug!(agent = %request.agent_id, "Invalid choice, re-prompting");

    request.prompt = prompts::strict_retry_prompt(&request.prompt, options);
    let retry = client.generate(&request, FallbackPool::General, cancel).await?;
    Ok(Choice {
        outcome: parse_choice_excluding(&retry.payload, options, own),
        raw: retry.payload,
    })
}

/// A day statement waiting for the day to finish.
struct DayStatement {
    player_id: String,
    name: String,
    round: u32,
    content: String,
    fallback: bool,
}

/// Drives one Mafia game.
pub struct GameEngine {
    config: GameConfig,
    unrestricted_mode: bool,
    client: ResilientClient,
    control: PauseControl,
    context: SessionContext,
    rng: StdRng,
    players: Vec<Player>,
    phase: GamePhase,
    day: u32,
    transitions: Vec<GameTransition>,
    ballots: Vec<Ballot>,
    last_night: Option<NightResolution>,
    last_tally: Option<VoteTally>,
    status: GameStatus,
}

impl GameEngine {
    /// Validate the game configuration and build an engine in `Setup`.
    /// Nothing about players exists until the first step.
    pub fn new(config: &SessionConfig, client: SharedAgentClient) -> Result<Self, ConfigurationError> {
        config.game.validate()?;
        let rng = match config.game.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config: config.game.clone(),
            unrestricted_mode: config.unrestricted_mode,
            client: ResilientClient::new(client, config.retry.clone()),
            control: PauseControl::new(),
            context: SessionContext::new(),
            rng,
            players: Vec::new(),
            phase: GamePhase::Setup,
            day: 0,
            transitions: Vec::new(),
            ballots: Vec::new(),
            last_night: None,
            last_tally: None,
            status: GameStatus::pending(),
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

    pub fn control(&self) -> PauseControl {
        self.control.clone()
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Current day; night N precedes day N.
    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn status(&self) -> &GameStatus {
        &self.status
    }

    pub fn transitions(&self) -> &[GameTransition] {
        &self.transitions
    }

    /// Every ballot cast this game, oldest first.
    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn last_night(&self) -> Option<&NightResolution> {
        self.last_night.as_ref()
    }

    pub fn last_tally(&self) -> Option<&VoteTally> {
        self.last_tally.as_ref()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Run the current phase once and return the phase entered afterwards.
    pub async fn step(&mut self) -> ProtocolResult<GamePhase> {
        if self.control.is_paused() {
            return Err(self.aborted());
        }
        self.absorb_interjections();

        match self.phase {
            GamePhase::Setup => self.setup()?,
            GamePhase::Night => self.night().await?,
            GamePhase::Day => self.day_discussion().await?,
            GamePhase::Voting => self.voting().await?,
            GamePhase::GameOver => return Err(ProtocolError::AlreadyComplete),
        }
        Ok(self.phase)
    }

    /// Step until `GameOver`, waiting out pauses.
    pub async fn run(&mut self) -> ProtocolResult<&GameStatus> {
        while !self.phase.is_terminal() {
            match self.step().await {
                Ok(_) => {}
                Err(e) if e.is_aborted() => {
                    info!(phase = %self.phase, day = self.day, "Game paused, waiting for resume");
                    self.control.wait_resumed().await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(&self.status)
    }

    /// Discard the current game and return to `Setup`. Roles are dealt
    /// again on the next step.
    pub fn reset(&mut self) {
        info!(session_id = %self.context.session_id, "Resetting game");
        self.players.clear();
        self.phase = GamePhase::Setup;
        self.day = 0;
        self.transitions.clear();
        self.ballots.clear();
        self.last_night = None;
        self.last_tally = None;
        self.status = GameStatus::pending();
        self.context.clear();
    }

    /// Format-agnostic snapshot for export.
    pub fn export(&self) -> SessionExport {
        let description = format!(
            "{} players: {} mafia, {} doctor, {} sheriff, {} detective",
            self.config.player_count,
            self.config.mafia_count,
            self.config.doctor_count,
            self.config.sheriff_count,
            self.config.detective_count
        );
        let outcome = self.status.game_over.then(|| self.status.message.clone());
        SessionExport::new("Mafia Game", &description, Vec::new(), outcome, self.context.transcript())
    }

    fn setup(&mut self) -> ProtocolResult<()> {
        self.players = create_players(&self.config, &mut self.rng)?;
        for player in &self.players {
            info!(player = %player.id, name = %player.name, role = %player.role, "Role dealt");
            self.context
                .remember(&player.id, format!("Game start: my role is {}.", player.role.title()));
        }
        let names: Vec<&str> = self.players.iter().map(|p| p.name.as_str()).collect();
        let opening = format!(
            "A new game begins with {} players: {}.",
            self.players.len(),
            names.join(", ")
        );
        self.context.announce(&opening);
        self.day = 1;
        self.transition(GamePhase::Night, "roles dealt")
    }

    async fn night(&mut self) -> ProtocolResult<()> {
        let cancel = self.control.token();
        let instructions = build_instructions(&self.players);
        let mut actions: Vec<NightAction> = Vec::with_capacity(instructions.len());
        let mut notes: Vec<(String, String)> = Vec::new();

        for role in Role::NIGHT_ORDER {
            let holders: Vec<(&Player, &NightInstruction)> = instructions
                .iter()
                .filter(|(_, instruction)| instruction.role == role)
                .filter_map(|(id, instruction)| self.player(id).map(|p| (p, instruction)))
                .collect();
            if holders.is_empty() {
                continue;
            }

            if !role.acts_at_night() {
                for (player, _) in &holders {
                    actions.push(NightAction {
                        actor_id: player.id.clone(),
                        role,
                        target_id: None,
                        fallback: false,
                    });
                    notes.push((
                        player.id.clone(),
                        format!("Night {}: I slept through the night as a civilian.", self.day),
                    ));
                }
                continue;
            }

            let requests: Vec<GenerationRequest> = {
                let table = Table {
                    day: self.day,
                    players: &self.players,
                    transcript: self.context.transcript(),
                };
                holders
                    .iter()
                    .map(|(player, instruction)| {
                        let voted_against = if role.is_mafia() {
                            self.voters_against(&player.id)
                        } else {
                            Vec::new()
                        };
                        GenerationRequest::new(
                            &player.id,
                            prompts::player_system_prompt(player, self.unrestricted_mode),
                            prompts::night_prompt(
                                &table,
                                player,
                                instruction,
                                &voted_against,
                                &self.context.memory().recall(&player.id),
                            ),
                            player.effective_params(),
                        )
                    })
                    .collect()
            };

            let client = &self.client;
            let cancel = &cancel;
            let choices = join_all(
                requests
                    .into_iter()
                    .zip(&holders)
                    .map(|(request, (_, instruction))| choose_target(client, request, instruction.targets.len(), None, cancel)),
            )
            .await;

            let mut collected = Vec::with_capacity(choices.len());
            for choice in choices {
                match choice {
                    Ok(choice) => collected.push(choice),
                    Err(Cancelled) => return Err(self.aborted()),
                }
            }

            let holders: Vec<(Player, Vec<TargetRef>)> = holders
                .into_iter()
                .map(|(p, instruction)| (p.clone(), instruction.targets.clone()))
                .collect();
            for ((player, targets), choice) in holders.iter().zip(collected) {
                let (index, fallback) = match choice.outcome.ok() {
                    Some(index) => (Some(index), false),
                    None => {
                        let index = self.fallback_target(player, targets);
                        warn!(player = %player.id, role = %role, "Unusable night choice, using fallback target");
                        (index, true)
                    }
                };
                let Some(target) = index.and_then(|i| targets.get(i)) else {
                    continue;
                };

                info!(player = %player.id, role = %role, target = %target.id, fallback, "Night action");
                actions.push(NightAction {
                    actor_id: player.id.clone(),
                    role,
                    target_id: Some(target.id.clone()),
                    fallback,
                });
                notes.push((player.id.clone(), self.night_choice_note(role, &target.name, &choice.raw, fallback)));
            }
        }

        let resolution = resolve_night(&self.players, &actions);
        for (id, note) in notes {
            self.context.remember(&id, note);
        }
        self.commit_night(&resolution, &actions);
        self.last_night = Some(resolution);

        let status = GameStatus::evaluate(&self.players);
        if status.game_over {
            self.finish(status)
        } else {
            self.status = status;
            self.transition(GamePhase::Day, "night resolved")
        }
    }

    fn night_choice_note(&self, role: Role, target: &str, raw: &str, fallback: bool) -> String {
        let day = self.day;
        match role {
            Role::Mafia if fallback => format!("Night {}: I chose {} as a strategic target.", day, target),
            Role::Mafia => format!("Night {}: I chose to kill {}. Reason: {}", day, target, raw),
            Role::Doctor => format!("Night {}: I chose to protect {}.", day, target),
            Role::Sheriff => format!("Night {}: I chose to investigate {}.", day, target),
            Role::Detective => format!("Night {}: I chose to track {}.", day, target),
            Role::Civilian => format!("Night {}: I slept through the night as a civilian.", day),
        }
    }

    fn commit_night(&mut self, resolution: &NightResolution, actions: &[NightAction]) {
        let day = self.day;

        for healed in &resolution.healed {
            let name = self.player(healed).map(|p| p.name.clone()).unwrap_or_default();
            let doctors = actions
                .iter()
                .filter(|a| a.role == Role::Doctor && a.target_id.as_deref() == Some(healed.as_str()));
            for doctor in doctors {
                self.context.remember(
                    &doctor.actor_id,
                    format!("Night {}: I successfully protected {} from the mafia attack.", day, name),
                );
            }
        }

        for (sheriff, result) in &resolution.investigations {
            let verdict = if result.is_mafia {
                "is a mafia member!"
            } else {
                "is not a mafia member."
            };
            self.context.remember(
                sheriff,
                format!("Night {}: My investigation revealed that {} {}", day, result.target_name, verdict),
            );
        }

        for (detective, result) in &resolution.tracking {
            let note = if result.interacted_with.is_empty() {
                format!(
                    "Night {}: I tracked {}, and it seems they stayed home and didn't interact with anyone.",
                    day, result.target_name
                )
            } else {
                format!(
                    "Night {}: I tracked {}, and they interacted with: {}.",
                    day,
                    result.target_name,
                    result.interacted_with.join(", ")
                )
            };
            self.context.remember(detective, note);
        }

        let mut killed_names = Vec::new();
        for id in &resolution.killed {
            if let Some(player) = self.players.iter_mut().find(|p| &p.id == id) {
                player.alive = false;
                killed_names.push(player.name.clone());
                info!(player = %player.id, day, "Player killed at night");
                self.context.publish(SessionEvent::PlayerEliminated {
                    session_id: self.context.session_id.clone(),
                    player_id: player.id.clone(),
                    player_name: player.name.clone(),
                    revealed_role: None,
                    day,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        let announcement = match killed_names.len() {
            0 => format!("Night {} results: No one was killed.", day),
            1 => format!("Night {} results: {} was killed during the night.", day, killed_names[0]),
            _ => format!("Night {} results: {} were killed during the night.", day, killed_names.join(", ")),
        };
        self.context.announce(&announcement);
    }

    async fn day_discussion(&mut self) -> ProtocolResult<()> {
        let cancel = self.control.token();
        let total = self.config.discussion_rounds;
        // Statements are held back until every round has finished so an
        // aborted day leaves the transcript untouched.
        let mut heard: Vec<(String, String)> = Vec::new();
        let mut statements: Vec<DayStatement> = Vec::new();

        for round in 1..=total {
            let turns: Vec<(String, String, GenerationRequest)> = {
                let table = Table {
                    day: self.day,
                    players: &self.players,
                    transcript: self.context.transcript(),
                };
                self.alive_players()
                    .map(|player| {
                        let request = GenerationRequest::new(
                            &player.id,
                            prompts::player_system_prompt(player, self.unrestricted_mode),
                            prompts::day_prompt(
                                &table,
                                player,
                                round,
                                total,
                                &heard,
                                &self.context.memory().recall(&player.id),
                            ),
                            player.effective_params(),
                        );
                        (player.id.clone(), player.name.clone(), request)
                    })
                    .collect()
            };

            let mut pending: FuturesUnordered<_> = turns
                .into_iter()
                .map(|(id, name, request)| {
                    let client = self.client.clone();
                    let cancel = cancel.clone();
                    async move {
                        let response = client.generate(&request, FallbackPool::DayStatement, &cancel).await;
                        (id, name, response)
                    }
                })
                .collect();

            while let Some((id, name, response)) = pending.next().await {
                let Ok(response) = response else {
                    return Err(self.aborted());
                };
                debug!(player = %id, round, fallback = response.is_fallback(), "Day statement");
                heard.push((name.clone(), response.payload.clone()));
                statements.push(DayStatement {
                    player_id: id,
                    name,
                    round,
                    fallback: response.is_fallback(),
                    content: response.payload,
                });
            }
        }

        for statement in statements {
            self.context.append(
                Speaker::agent(&statement.player_id),
                &statement.name,
                &statement.content,
                statement.fallback,
            );
            let suffix = if statement.fallback {
                " (auto-generated response)"
            } else {
                ""
            };
            self.context.remember(
                &statement.player_id,
                format!(
                    "Day {} discussion (round {}): {}{}",
                    self.day, statement.round, statement.content, suffix
                ),
            );
        }
        self.transition(GamePhase::Voting, "discussion finished")
    }

    async fn voting(&mut self) -> ProtocolResult<()> {
        let cancel = self.control.token();
        let candidates: Vec<Player> = self.alive_players().cloned().collect();

        let requests: Vec<GenerationRequest> = {
            let table = Table {
                day: self.day,
                players: &self.players,
                transcript: self.context.transcript(),
            };
            let refs: Vec<&Player> = candidates.iter().collect();
            candidates
                .iter()
                .map(|voter| {
                    GenerationRequest::new(
                        &voter.id,
                        prompts::player_system_prompt(voter, self.unrestricted_mode),
                        prompts::vote_prompt(&table, voter, &refs, &self.context.memory().recall(&voter.id)),
                        voter.effective_params().for_ballot(),
                    )
                })
                .collect()
        };

        let client = &self.client;
        let cancel = &cancel;
        let options = candidates.len();
        let choices = join_all(
            requests
                .into_iter()
                .enumerate()
                .map(|(own, request)| choose_target(client, request, options, Some(own), cancel)),
        )
        .await;

        let mut collected = Vec::with_capacity(choices.len());
        for choice in choices {
            match choice {
                Ok(choice) => collected.push(choice),
                Err(Cancelled) => return Err(self.aborted()),
            }
        }

        let day = self.day;
        let mut ballots = Vec::with_capacity(candidates.len());
        let mut notes = Vec::with_capacity(candidates.len());
        for (voter, choice) in candidates.iter().zip(collected) {
            let others: Vec<TargetRef> = candidates
                .iter()
                .filter(|p| p.id != voter.id)
                .map(TargetRef::from)
                .collect();

            let (target, random_fallback, note) = match choice.outcome.map(|i| &candidates[i]) {
                Ok(target) => (
                    TargetRef::from(target),
                    false,
                    format!("Day {} vote: I voted to eliminate {}.", day, target.name),
                ),
                Err(ParseError::SelfTarget) => {
                    let Some(target) = others.choose(&mut self.rng).cloned() else {
                        continue;
                    };
                    warn!(player = %voter.id, "Self-vote replaced by random target");
                    let note = format!(
                        "Day {} vote: I tried to vote for myself, but that's not allowed. Random vote for {}.",
                        day, target.name
                    );
                    (target, true, note)
                }
                Err(_) => {
                    let Some(target) = self.fallback_target(voter, &others).and_then(|i| others.get(i)).cloned() else {
                        continue;
                    };
                    warn!(player = %voter.id, "Unusable ballot, using fallback target");
                    let note = format!("Day {} vote: I voted to eliminate {}.", day, target.name);
                    (target, true, note)
                }
            };

            info!(voter = %voter.id, target = %target.id, random_fallback, "Ballot cast");
            self.context
                .announce(&format!("{} votes to eliminate {}.", voter.name, target.name));
            notes.push((voter.id.clone(), note));
            ballots.push(Ballot {
                voter_id: voter.id.clone(),
                target_id: target.id,
                day,
                random_fallback,
            });
        }

        let result = tally(&self.players, &ballots);
        for (id, note) in notes {
            self.context.remember(&id, note);
        }
        self.ballots.extend(ballots);

        match &result.eliminated {
            Some(id) => {
                if let Some(player) = self.players.iter_mut().find(|p| &p.id == id) {
                    player.alive = false;
                    let announcement = format!(
                        "{} was voted out and revealed to be a {}.",
                        player.name, player.role
                    );
                    info!(player = %player.id, role = %player.role, day, "Player voted out");
                    self.context.publish(SessionEvent::PlayerEliminated {
                        session_id: self.context.session_id.clone(),
                        player_id: player.id.clone(),
                        player_name: player.name.clone(),
                        revealed_role: Some(player.role.to_string()),
                        day,
                        timestamp: chrono::Utc::now(),
                    });
                    self.context.announce(&announcement);
                }
            }
            None => {
                info!(day, "Vote tied, no elimination");
                self.context
                    .announce("The vote was tied. No one was eliminated today.");
            }
        }
        self.last_tally = Some(result);

        let status = GameStatus::evaluate(&self.players);
        if status.game_over {
            self.finish(status)
        } else {
            self.status = status;
            self.day += 1;
            self.transition(GamePhase::Night, "vote resolved")
        }
    }

    /// Ids of living players who ever voted to eliminate `player_id`, most
    /// recent first.
    fn voter_ids_against(&self, player_id: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.ballots
            .iter()
            .rev()
            .filter(|b| b.target_id == player_id)
            .map(|b| b.voter_id.as_str())
            .filter(|id| self.player(id).is_some_and(|p| p.alive))
            .filter(|id| seen.insert(*id))
            .collect()
    }

    fn voters_against(&self, player_id: &str) -> Vec<String> {
        self.voter_ids_against(player_id)
            .into_iter()
            .filter_map(|id| self.player(id))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Heuristic replacement for an unusable choice: a mafia member goes
    /// after whoever voted against them, everyone else picks at random.
    fn fallback_target(&mut self, actor: &Player, options: &[TargetRef]) -> Option<usize> {
        if actor.role.is_mafia() {
            let against = self.voter_ids_against(&actor.id);
            if let Some(index) = against
                .iter()
                .find_map(|id| options.iter().position(|t| t.id == *id))
            {
                return Some(index);
            }
        }
        let indices: Vec<usize> = (0..options.len()).collect();
        indices.choose(&mut self.rng).copied()
    }

    fn finish(&mut self, status: GameStatus) -> ProtocolResult<()> {
        let winner = status.winner.map(|w| w.to_string()).unwrap_or_default();
        self.transition(GamePhase::GameOver, &format!("{} win", winner))?;

        self.context.announce(&status.message);
        let reveal: Vec<String> = self
            .players
            .iter()
            .map(|p| {
                let state = if p.alive { "" } else { " (eliminated)" };
                format!("{}: {}{}", p.name, p.role.title(), state)
            })
            .collect();
        self.context
            .announce(&format!("Roles revealed: {}.", reveal.join(", ")));
        self.context.publish(SessionEvent::GameOver {
            session_id: self.context.session_id.clone(),
            winner,
            message: status.message.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.status = status;
        Ok(())
    }

    fn absorb_interjections(&mut self) {
        for text in self.control.take_interjections() {
            info!(phase = %self.phase, "User interjection added to game log");
            self.context.append(Speaker::User, "User", &text, false);
        }
    }

    fn transition(&mut self, to: GamePhase, reason: &str) -> ProtocolResult<()> {
        let from = self.phase;
        if !from.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from,
                to,
                reason: format!("not a valid transition from {}", from),
            }
            .into());
        }

        self.phase = to;
        self.transitions.push(GameTransition {
            from,
            to,
            day: self.day,
            timestamp: chrono::Utc::now(),
            reason: reason.to_string(),
        });
        info!(
            session_id = %self.context.session_id,
            from = %from,
            to = %to,
            day = self.day,
            reason,
            alive = self.alive_players().count(),
            "Game phase transition"
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
        info!(phase = %self.phase, day = self.day, "Step aborted by pause");
        ProtocolError::Aborted {
            phase: self.phase.to_string(),
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

    /// Answers every numbered prompt with "1" and everything else with a line.
    struct FirstOptionClient;

    #[async_trait]
    impl AgentClient for FirstOptionClient {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            if request.prompt.contains("Respond with ONLY the NUMBER") {
                Ok("1".into())
            } else {
                Ok(format!("{} has thoughts.", request.agent_id))
            }
        }
    }

    /// Never gives a number.
    struct EvasiveClient;

    #[async_trait]
    impl AgentClient for EvasiveClient {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok("I'd rather not say.".into())
        }
    }

    fn mock_config(players: usize, seed: u64) -> SessionConfig {
        let mut config = SessionConfig::default();
        config.game = GameConfig {
            player_count: players,
            mafia_count: 1,
            doctor_count: 0,
            sheriff_count: 0,
            detective_count: 0,
            discussion_rounds: 1,
            seed: Some(seed),
            players: Vec::new(),
        };
        config.retry.backoff_ms = 0;
        config
    }

    #[test]
    fn test_invalid_config_is_rejected_before_setup() {
        let mut config = mock_config(5, 1);
        config.game.mafia_count = 3;
        let err = GameEngine::new(&config, Arc::new(FirstOptionClient)).err().unwrap();
        assert_eq!(err, ConfigurationError::TooManyMafia { mafia: 3, players: 5 });
    }

    #[tokio::test]
    async fn test_setup_deals_roles() {
        let mut engine = GameEngine::new(&mock_config(6, 11), Arc::new(FirstOptionClient)).unwrap();
        assert!(engine.players().is_empty());

        assert_eq!(engine.step().await.unwrap(), GamePhase::Night);
        assert_eq!(engine.players().len(), 6);
        assert_eq!(engine.players().iter().filter(|p| p.role.is_mafia()).count(), 1);
        assert_eq!(engine.day(), 1);
        for player in engine.players() {
            assert!(engine.context().memory().recall(&player.id).starts_with("Game start"));
        }
    }

    #[tokio::test]
    async fn test_night_kills_first_non_mafia() {
        let mut engine = GameEngine::new(&mock_config(5, 3), Arc::new(FirstOptionClient)).unwrap();
        engine.step().await.unwrap();
        let victim = engine.players().iter().find(|p| !p.role.is_mafia()).unwrap().id.clone();

        assert_eq!(engine.step().await.unwrap(), GamePhase::Day);
        assert!(!engine.player(&victim).unwrap().alive);
        assert_eq!(engine.last_night().unwrap().killed, vec![victim]);
        assert_eq!(engine.alive_players().count(), 4);
    }

    #[tokio::test]
    async fn test_unparsable_choices_fall_back() {
        let mut engine = GameEngine::new(&mock_config(5, 8), Arc::new(EvasiveClient)).unwrap();
        engine.step().await.unwrap();
        engine.step().await.unwrap();
        assert_eq!(engine.last_night().unwrap().killed.len(), 1);

        engine.step().await.unwrap();
        engine.step().await.unwrap();
        let day_one: Vec<&Ballot> = engine.ballots().iter().filter(|b| b.day == 1).collect();
        assert_eq!(day_one.len(), 4);
        assert!(day_one.iter().all(|b| b.random_fallback && b.voter_id != b.target_id));
    }

    #[tokio::test]
    async fn test_self_vote_is_redirected_to_another_player() {
        let mut engine = GameEngine::new(&mock_config(5, 3), Arc::new(FirstOptionClient)).unwrap();
        while engine.phase() != GamePhase::Voting {
            engine.step().await.unwrap();
        }
        let first_seat = engine.alive_players().next().unwrap().id.clone();

        engine.step().await.unwrap();
        let own = engine.ballots().iter().find(|b| b.voter_id == first_seat).unwrap();
        assert!(own.random_fallback);
        assert_ne!(own.target_id, first_seat);
        assert!(engine
            .context()
            .memory()
            .recall(&first_seat)
            .contains("I tried to vote for myself"));
        assert!(engine
            .ballots()
            .iter()
            .filter(|b| b.voter_id != first_seat)
            .all(|b| !b.random_fallback && b.target_id == first_seat));
    }

    #[tokio::test]
    async fn test_dead_voters_are_not_counted_against() {
        let mut engine = GameEngine::new(&mock_config(5, 3), Arc::new(FirstOptionClient)).unwrap();
        engine.step().await.unwrap();
        let mafia = engine.players().iter().find(|p| p.role.is_mafia()).unwrap().id.clone();
        let town: Vec<String> = engine
            .players()
            .iter()
            .filter(|p| !p.role.is_mafia())
            .map(|p| p.id.clone())
            .collect();
        for voter in &town[..2] {
            engine.ballots.push(Ballot {
                voter_id: voter.clone(),
                target_id: mafia.clone(),
                day: 1,
                random_fallback: false,
            });
        }
        assert_eq!(engine.voter_ids_against(&mafia), vec![town[1].as_str(), town[0].as_str()]);

        if let Some(player) = engine.players.iter_mut().find(|p| p.id == town[1]) {
            player.alive = false;
        }
        assert_eq!(engine.voter_ids_against(&mafia), vec![town[0].as_str()]);
        let name = engine.player(&town[0]).unwrap().name.clone();
        assert_eq!(engine.voters_against(&mafia), vec![name]);
    }

    #[tokio::test]
    async fn test_paused_step_is_aborted_and_game_over_is_terminal() {
        let mut engine = GameEngine::new(&mock_config(4, 5), Arc::new(FirstOptionClient)).unwrap();
        let control = engine.control();
        control.pause();
        assert!(engine.step().await.unwrap_err().is_aborted());
        assert_eq!(engine.phase(), GamePhase::Setup);
        control.resume(None);

        let status = engine.run().await.unwrap().clone();
        assert!(status.game_over);
        assert!(engine.status().winner.is_some());
        assert!(matches!(engine.step().await, Err(ProtocolError::AlreadyComplete)));
        assert!(engine
            .context()
            .transcript()
            .entries()
            .iter()
            .any(|e| e.content.starts_with("Roles revealed:")));
    }

    #[tokio::test]
    async fn test_reset_starts_new_game() {
        let mut engine = GameEngine::new(&mock_config(4, 5), Arc::new(FirstOptionClient)).unwrap();
        engine.run().await.unwrap();
        engine.reset();
        assert_eq!(engine.phase(), GamePhase::Setup);
        assert!(engine.players().is_empty());
        assert!(engine.context().transcript().is_empty());
        assert_eq!(engine.step().await.unwrap(), GamePhase::Night);
    }
}
