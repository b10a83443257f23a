//! Roles, players, and role assignment.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::client::GenerationParams;
use crate::config::{Creativity, GameConfig};
use crate::error::ConfigurationError;

/// Palette for seats without a configured colour.
pub const PLAYER_COLORS: [&str; 8] = [
    "#3a86ff", "#8338ec", "#ff9e00", "#06d6a0", "#ef476f", "#118ab2", "#ffd166", "#e63946",
];

/// Hidden role of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Mafia,
    Doctor,
    Sheriff,
    Detective,
    Civilian,
}

impl Role {
    /// Night collection order. Later roles may observe earlier roles' actions.
    pub const NIGHT_ORDER: [Role; 5] = [
        Role::Mafia,
        Role::Doctor,
        Role::Sheriff,
        Role::Detective,
        Role::Civilian,
    ];

    pub fn is_mafia(self) -> bool {
        self == Role::Mafia
    }

    /// Whether this role picks a target at night.
    pub fn acts_at_night(self) -> bool {
        self != Role::Civilian
    }

    /// Position in [`Role::NIGHT_ORDER`].
    pub fn night_priority(self) -> usize {
        match self {
            Self::Mafia => 0,
            Self::Doctor => 1,
            Self::Sheriff => 2,
            Self::Detective => 3,
            Self::Civilian => 4,
        }
    }

    /// Capitalised name for announcements.
    pub fn title(self) -> &'static str {
        match self {
            Self::Mafia => "Mafia",
            Self::Doctor => "Doctor",
            Self::Sheriff => "Sheriff",
            Self::Detective => "Detective",
            Self::Civilian => "Civilian",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mafia => write!(f, "mafia"),
            Self::Doctor => write!(f, "doctor"),
            Self::Sheriff => write!(f, "sheriff"),
            Self::Detective => write!(f, "detective"),
            Self::Civilian => write!(f, "civilian"),
        }
    }
}

/// A seat in the game. Dead players stay in the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// `playerN`, 1-indexed by seat.
    pub id: String,
    pub name: String,
    pub color: String,
    pub role: Role,
    pub alive: bool,
    /// 0-indexed seat; used for deterministic tie-breaks.
    pub seat: usize,
    pub params: GenerationParams,
    pub creativity: Creativity,
}

impl Player {
    /// Sampling parameters with the creativity adjustment applied.
    pub fn effective_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.creativity.adjust(self.params.temperature),
            ..self.params.clone()
        }
    }
}

/// Role multiset for a validated config, in a uniformly random seat order.
pub fn assign_roles<R: Rng + ?Sized>(config: &GameConfig, rng: &mut R) -> Result<Vec<Role>, ConfigurationError> {
    config.validate()?;
    let mut roles = Vec::with_capacity(config.player_count);
    roles.extend(std::iter::repeat(Role::Mafia).take(config.mafia_count));
    roles.extend(std::iter::repeat(Role::Doctor).take(config.doctor_count));
    roles.extend(std::iter::repeat(Role::Sheriff).take(config.sheriff_count));
    roles.extend(std::iter::repeat(Role::Detective).take(config.detective_count));
    roles.resize(config.player_count, Role::Civilian);
    roles.shuffle(rng);
    Ok(roles)
}

/// Seat players and deal roles.
pub fn create_players<R: Rng + ?Sized>(config: &GameConfig, rng: &mut R) -> Result<Vec<Player>, ConfigurationError> {
    let roles = assign_roles(config, rng)?;
    Ok(roles
        .into_iter()
        .enumerate()
        .map(|(seat, role)| {
            let profile = config.players.get(seat).cloned().unwrap_or_default();
            Player {
                id: format!("player{}", seat + 1),
                name: if profile.name.trim().is_empty() {
                    format!("Network {}", seat + 1)
                } else {
                    profile.name
                },
                color: if profile.color.trim().is_empty() {
                    PLAYER_COLORS[seat % PLAYER_COLORS.len()].to_string()
                } else {
                    profile.color
                },
                role,
                alive: true,
                seat,
                params: profile.params,
                creativity: profile.creativity,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::config::PlayerProfile;

    fn mock_config(players: usize, mafia: usize, doctor: usize) -> GameConfig {
        GameConfig {
            player_count: players,
            mafia_count: mafia,
            doctor_count: doctor,
            sheriff_count: 0,
            detective_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_assign_roles_counts() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = GameConfig {
            detective_count: 1,
            ..mock_config(8, 2, 1)
        };
        let roles = assign_roles(&config, &mut rng).unwrap();
        assert_eq!(roles.len(), 8);
        assert_eq!(roles.iter().filter(|r| r.is_mafia()).count(), 2);
        assert_eq!(roles.iter().filter(|r| **r == Role::Doctor).count(), 1);
        assert_eq!(roles.iter().filter(|r| **r == Role::Detective).count(), 1);
        assert_eq!(roles.iter().filter(|r| **r == Role::Civilian).count(), 4);
    }

    #[test]
    fn test_assignment_is_seeded() {
        let config = mock_config(8, 3, 2);
        let a = assign_roles(&config, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = assign_roles(&config, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_reaches_every_seat() {
        let config = mock_config(5, 1, 0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 5];
        for _ in 0..200 {
            let roles = assign_roles(&config, &mut rng).unwrap();
            let seat = roles.iter().position(|r| r.is_mafia()).unwrap();
            seen[seat] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_invalid_config_creates_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = create_players(&mock_config(4, 2, 0), &mut rng).unwrap_err();
        assert_eq!(err, ConfigurationError::TooManyMafia { mafia: 2, players: 4 });
    }

    #[test]
    fn test_create_players_uses_profiles() {
        let mut config = mock_config(4, 1, 0);
        config.players = vec![
            PlayerProfile {
                name: "Alice".into(),
                creativity: Creativity::High,
                ..Default::default()
            },
            PlayerProfile::default(),
            PlayerProfile::default(),
            PlayerProfile::default(),
        ];
        let players = create_players(&config, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(players[0].name, "Alice");
        assert_eq!(players[1].name, "Network 2");
        assert_eq!(players[1].id, "player2");
        assert_eq!(players[1].color, PLAYER_COLORS[1]);
        assert!((players[0].effective_params().temperature - 0.9).abs() < 1e-6);
        assert!(players.iter().all(|p| p.alive));
    }
}
