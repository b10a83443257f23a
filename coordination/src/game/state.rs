//! Game phase machine and win-condition evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

use super::roles::Player;

/// Phase of a Mafia game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    /// Configured, roles not yet dealt.
    Setup,
    /// Secret role actions.
    Night,
    /// Public discussion rounds.
    Day,
    /// Elimination vote.
    Voting,
    /// Winner decided, roles revealed.
    GameOver,
}

impl GamePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::GameOver)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [GamePhase] {
        match self {
            Self::Setup => &[Self::Night],
            Self::Night => &[Self::Day, Self::GameOver],
            Self::Day => &[Self::Voting],
            Self::Voting => &[Self::Night, Self::GameOver],
            Self::GameOver => &[],
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Night => write!(f, "night"),
            Self::Day => write!(f, "day"),
            Self::Voting => write!(f, "voting"),
            Self::GameOver => write!(f, "game_over"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameTransition {
    pub from: GamePhase,
    pub to: GamePhase,
    /// Day counter at the time of the transition.
    pub day: u32,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: GamePhase,
    pub to: GamePhase,
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

/// Winning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Mafia,
    Civilians,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mafia => write!(f, "mafia"),
            Self::Civilians => write!(f, "civilians"),
        }
    }
}

/// Win-condition result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub game_over: bool,
    pub winner: Option<Winner>,
    pub message: String,
}

impl GameStatus {
    /// Evaluate win conditions over the current roster. Pure: the same
    /// roster always gives the same status.
    pub fn evaluate(players: &[Player]) -> Self {
        let alive_mafia = players.iter().filter(|p| p.alive && p.role.is_mafia()).count();
        let alive_others = players.iter().filter(|p| p.alive && !p.role.is_mafia()).count();

        if alive_mafia == 0 {
            Self {
                game_over: true,
                winner: Some(Winner::Civilians),
                message: "All mafia members have been eliminated. Civilians win!".to_string(),
            }
        } else if alive_mafia >= alive_others {
            Self {
                game_over: true,
                winner: Some(Winner::Mafia),
                message: "The mafia now equal or outnumber the civilians. Mafia wins!".to_string(),
            }
        } else {
            Self {
                game_over: false,
                winner: None,
                message: format!(
                    "{} mafia and {} others remain.",
                    alive_mafia, alive_others
                ),
            }
        }
    }

    /// Status before any player exists.
    pub fn pending() -> Self {
        Self {
            game_over: false,
            winner: None,
            message: "Game has not started.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GenerationParams;
    use crate::config::Creativity;
    use crate::game::roles::Role;

    fn mock_players(roles: &[(Role, bool)]) -> Vec<Player> {
        roles
            .iter()
            .enumerate()
            .map(|(seat, (role, alive))| Player {
                id: format!("player{}", seat + 1),
                name: format!("Network {}", seat + 1),
                color: "#000000".into(),
                role: *role,
                alive: *alive,
                seat,
                params: GenerationParams::default(),
                creativity: Creativity::Normal,
            })
            .collect()
    }

    #[test]
    fn test_civilians_win_when_no_mafia_alive() {
        let players = mock_players(&[(Role::Mafia, false), (Role::Civilian, true), (Role::Doctor, true)]);
        let status = GameStatus::evaluate(&players);
        assert!(status.game_over);
        assert_eq!(status.winner, Some(Winner::Civilians));
    }

    #[test]
    fn test_mafia_wins_at_parity() {
        let players = mock_players(&[
            (Role::Mafia, true),
            (Role::Civilian, true),
            (Role::Civilian, false),
            (Role::Sheriff, false),
        ]);
        let status = GameStatus::evaluate(&players);
        assert!(status.game_over);
        assert_eq!(status.winner, Some(Winner::Mafia));
    }

    #[test]
    fn test_game_continues() {
        let players = mock_players(&[
            (Role::Mafia, true),
            (Role::Civilian, true),
            (Role::Civilian, true),
            (Role::Doctor, false),
        ]);
        let status = GameStatus::evaluate(&players);
        assert!(!status.game_over);
        assert_eq!(status.winner, None);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let alive_patterns = [
            [true, true, true, true, true],
            [true, false, true, false, true],
            [false, true, true, true, true],
            [true, true, false, false, false],
        ];
        for alive in alive_patterns {
            let players = mock_players(&[
                (Role::Mafia, alive[0]),
                (Role::Mafia, alive[1]),
                (Role::Civilian, alive[2]),
                (Role::Doctor, alive[3]),
                (Role::Civilian, alive[4]),
            ]);
            let first = GameStatus::evaluate(&players);
            let second = GameStatus::evaluate(&players);
            assert_eq!(first, second);

            let mafia = alive[0] as usize + alive[1] as usize;
            let others = alive[2] as usize + alive[3] as usize + alive[4] as usize;
            assert_eq!(first.game_over, mafia == 0 || mafia >= others);
        }
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(GamePhase::Setup.valid_transitions(), &[GamePhase::Night]);
        assert!(GamePhase::Voting.valid_transitions().contains(&GamePhase::Night));
        assert!(GamePhase::GameOver.valid_transitions().is_empty());
        assert!(GamePhase::GameOver.is_terminal());
    }
}
