//! Night instructions and deterministic night resolution.
//!
//! ```text
//! alive roster ──build_instructions──▶ NightInstruction per alive player
//!                                           │  (collected by role, in NIGHT_ORDER)
//!                                           ▼
//!                                     Vec<NightAction>
//!                                           │
//!                           resolve_night ──┴──▶ NightResolution
//!   mafia plurality (earliest seat on ties) ─ doctor heal cancels kill
//!   sheriff learns mafia / not mafia        ─ detective sees same-night targets
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::roles::{Player, Role};

/// A selectable player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub id: String,
    pub name: String,
}

impl From<&Player> for TargetRef {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
        }
    }
}

/// What one alive player may do tonight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightInstruction {
    pub role: Role,
    /// Numbered 1.. in prompts. Empty for civilians.
    pub targets: Vec<TargetRef>,
    /// Names of the other living mafia; empty for everyone else.
    pub fellow_mafia: Vec<String>,
}

/// Build one instruction per alive player, in seat order.
///
/// Mafia target every living non-mafia player. Doctors may heal anyone alive,
/// themselves included. Sheriffs and detectives pick anyone alive but
/// themselves.
pub fn build_instructions(players: &[Player]) -> Vec<(String, NightInstruction)> {
    let alive: Vec<&Player> = players.iter().filter(|p| p.alive).collect();

    alive
        .iter()
        .map(|player| {
            let targets: Vec<TargetRef> = match player.role {
                Role::Mafia => alive
                    .iter()
                    .filter(|p| !p.role.is_mafia())
                    .map(|p| TargetRef::from(*p))
                    .collect(),
                Role::Doctor => alive.iter().map(|p| TargetRef::from(*p)).collect(),
                Role::Sheriff | Role::Detective => alive
                    .iter()
                    .filter(|p| p.id != player.id)
                    .map(|p| TargetRef::from(*p))
                    .collect(),
                Role::Civilian => Vec::new(),
            };
            let fellow_mafia = if player.role.is_mafia() {
                alive
                    .iter()
                    .filter(|p| p.role.is_mafia() && p.id != player.id)
                    .map(|p| p.name.clone())
                    .collect()
            } else {
                Vec::new()
            };
            (
                player.id.clone(),
                NightInstruction {
                    role: player.role,
                    targets,
                    fellow_mafia,
                },
            )
        })
        .collect()
}

/// One submitted night action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightAction {
    pub actor_id: String,
    pub role: Role,
    /// `None` for civilians.
    pub target_id: Option<String>,
    /// Chosen by fallback heuristic rather than parsed from the agent.
    pub fallback: bool,
}

/// Sheriff result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigation {
    pub target_id: String,
    pub target_name: String,
    pub is_mafia: bool,
}

/// Detective result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub target_id: String,
    pub target_name: String,
    /// Names of players the tracked player targeted tonight. Empty means
    /// they stayed home.
    pub interacted_with: Vec<String>,
}

/// Outcome of one night.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightResolution {
    /// Target the mafia settled on, whether or not it was healed.
    pub mafia_target: Option<String>,
    pub killed: Vec<String>,
    pub healed: Vec<String>,
    /// Keyed by sheriff id.
    pub investigations: BTreeMap<String, Investigation>,
    /// Keyed by detective id.
    pub tracking: BTreeMap<String, Tracking>,
}

fn find<'a>(players: &'a [Player], id: &str) -> Option<&'a Player> {
    players.iter().find(|p| p.id == id)
}

/// Plurality over mafia submissions. Ties go to the tied target seated
/// first.
pub fn resolve_mafia_target(players: &[Player], actions: &[NightAction]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for action in actions.iter().filter(|a| a.role.is_mafia()) {
        if let Some(target) = &action.target_id {
            *counts.entry(target.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter_map(|(id, votes)| find(players, id).map(|p| (p.seat, id, votes)))
        .max_by(|a, b| a.2.cmp(&b.2).then_with(|| b.0.cmp(&a.0)))
        .map(|(_, id, _)| id.to_string())
}

/// Resolve a full night from every submitted action.
pub fn resolve_night(players: &[Player], actions: &[NightAction]) -> NightResolution {
    let mut resolution = NightResolution {
        mafia_target: resolve_mafia_target(players, actions),
        ..Default::default()
    };

    if let Some(target) = &resolution.mafia_target {
        let healed = actions
            .iter()
            .any(|a| a.role == Role::Doctor && a.target_id.as_deref() == Some(target.as_str()));
        if healed {
            resolution.healed.push(target.clone());
        } else if find(players, target).is_some_and(|p| p.alive) {
            resolution.killed.push(target.clone());
        }
    }

    for action in actions {
        let Some(target) = action.target_id.as_deref().and_then(|id| find(players, id)) else {
            continue;
        };
        match action.role {
            Role::Sheriff => {
                resolution.investigations.insert(
                    action.actor_id.clone(),
                    Investigation {
                        target_id: target.id.clone(),
                        target_name: target.name.clone(),
                        is_mafia: target.role.is_mafia(),
                    },
                );
            }
            Role::Detective => {
                let interacted_with = actions
                    .iter()
                    .filter(|a| a.actor_id == target.id && a.role.night_priority() < Role::Detective.night_priority())
                    .filter_map(|a| a.target_id.as_deref().and_then(|id| find(players, id)))
                    .map(|p| p.name.clone())
                    .collect();
                resolution.tracking.insert(
                    action.actor_id.clone(),
                    Tracking {
                        target_id: target.id.clone(),
                        target_name: target.name.clone(),
                        interacted_with,
                    },
                );
            }
            _ => {}
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GenerationParams;
    use crate::config::Creativity;

    fn mock_players(roles: &[Role]) -> Vec<Player> {
        roles
            .iter()
            .enumerate()
            .map(|(seat, role)| Player {
                id: format!("player{}", seat + 1),
                name: format!("Network {}", seat + 1),
                color: "#000000".into(),
                role: *role,
                alive: true,
                seat,
                params: GenerationParams::default(),
                creativity: Creativity::Normal,
            })
            .collect()
    }

    fn act(actor: &str, role: Role, target: Option<&str>) -> NightAction {
        NightAction {
            actor_id: actor.into(),
            role,
            target_id: target.map(str::to_string),
            fallback: false,
        }
    }

    #[test]
    fn test_instruction_targets_by_role() {
        let players = mock_players(&[Role::Mafia, Role::Mafia, Role::Doctor, Role::Sheriff, Role::Civilian]);
        let instructions = build_instructions(&players);
        let by_id: HashMap<_, _> = instructions.into_iter().collect();

        let mafia = &by_id["player1"];
        let ids: Vec<_> = mafia.targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["player3", "player4", "player5"]);
        assert_eq!(mafia.fellow_mafia, vec!["Network 2"]);

        assert_eq!(by_id["player3"].targets.len(), 5);
        assert!(by_id["player4"].targets.iter().all(|t| t.id != "player4"));
        assert!(by_id["player5"].targets.is_empty());
        assert!(by_id["player5"].fellow_mafia.is_empty());
    }

    #[test]
    fn test_dead_players_get_no_instruction() {
        let mut players = mock_players(&[Role::Mafia, Role::Civilian, Role::Civilian, Role::Civilian]);
        players[1].alive = false;
        let instructions = build_instructions(&players);
        assert_eq!(instructions.len(), 3);
        assert!(instructions[0].1.targets.iter().all(|t| t.id != "player2"));
    }

    #[test]
    fn test_mafia_plurality_and_tie_break() {
        let players = mock_players(&[Role::Mafia, Role::Mafia, Role::Mafia, Role::Civilian, Role::Civilian, Role::Civilian]);
        let majority = [
            act("player1", Role::Mafia, Some("player6")),
            act("player2", Role::Mafia, Some("player6")),
            act("player3", Role::Mafia, Some("player4")),
        ];
        assert_eq!(resolve_mafia_target(&players, &majority).as_deref(), Some("player6"));

        let tie = [
            act("player1", Role::Mafia, Some("player6")),
            act("player2", Role::Mafia, Some("player5")),
        ];
        assert_eq!(resolve_mafia_target(&players, &tie).as_deref(), Some("player5"));
        assert_eq!(resolve_mafia_target(&players, &[]), None);
    }

    #[test]
    fn test_doctor_heal_cancels_kill() {
        let players = mock_players(&[Role::Mafia, Role::Doctor, Role::Civilian, Role::Civilian]);
        let actions = [
            act("player1", Role::Mafia, Some("player3")),
            act("player2", Role::Doctor, Some("player3")),
        ];
        let resolution = resolve_night(&players, &actions);
        assert!(resolution.killed.is_empty());
        assert_eq!(resolution.healed, vec!["player3"]);

        let missed = [
            act("player1", Role::Mafia, Some("player3")),
            act("player2", Role::Doctor, Some("player4")),
        ];
        let resolution = resolve_night(&players, &missed);
        assert_eq!(resolution.killed, vec!["player3"]);
        assert!(resolution.healed.is_empty());
    }

    #[test]
    fn test_sheriff_and_detective_results() {
        let players = mock_players(&[Role::Mafia, Role::Sheriff, Role::Detective, Role::Civilian, Role::Civilian]);
        let actions = [
            act("player1", Role::Mafia, Some("player4")),
            act("player2", Role::Sheriff, Some("player1")),
            act("player3", Role::Detective, Some("player1")),
            act("player4", Role::Civilian, None),
        ];
        let resolution = resolve_night(&players, &actions);

        let investigation = &resolution.investigations["player2"];
        assert!(investigation.is_mafia);
        assert_eq!(investigation.target_name, "Network 1");

        let tracking = &resolution.tracking["player3"];
        assert_eq!(tracking.target_name, "Network 1");
        assert_eq!(tracking.interacted_with, vec!["Network 4"]);
    }

    #[test]
    fn test_detective_sees_stay_home() {
        let players = mock_players(&[Role::Mafia, Role::Detective, Role::Civilian, Role::Civilian]);
        let actions = [
            act("player1", Role::Mafia, Some("player3")),
            act("player2", Role::Detective, Some("player4")),
            act("player4", Role::Civilian, None),
        ];
        let resolution = resolve_night(&players, &actions);
        assert!(resolution.tracking["player2"].interacted_with.is_empty());
        assert_eq!(resolution.killed, vec!["player3"]);
    }
}
