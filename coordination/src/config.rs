//! Session configuration.
//!
//! Passed explicitly into the discussion coordinator and the game engine.
//! Loaded from TOML; every field has a default so a partial file works.
//!
//! ```toml
//! unrestricted_mode = false
//!
//! [discussion]
//! topic_name = "Offline-first notes app"
//! max_iterations = 3
//! exchange_rounds = 1
//!
//! [game]
//! player_count = 6
//! mafia_count = 1
//! seed = 42
//!
//! [retry]
//! max_retries = 2
//! backoff_ms = 1000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregator::UnparsedVotePolicy;
use crate::client::GenerationParams;
use crate::error::ConfigurationError;
use crate::resilience::RetryPolicy;

/// Supported player counts.
pub const MIN_PLAYERS: usize = 4;
pub const MAX_PLAYERS: usize = 8;
/// Cap on each special role.
pub const MAX_PER_SPECIAL_ROLE: usize = 2;

/// Top-level configuration for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub discussion: DiscussionConfig,
    pub game: GameConfig,
    pub retry: RetryPolicy,
    /// Passthrough flag for prompt construction only.
    pub unrestricted_mode: bool,
}

impl SessionConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.discussion.validate()?;
        config.game.validate()?;
        Ok(config)
    }
}

/// Discussion-and-consensus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionConfig {
    pub topic_name: String,
    pub topic_description: String,
    /// Accepted iterations before finalizing. At least 1.
    pub max_iterations: u32,
    /// Extra passes over the enabled agents after the first.
    pub exchange_rounds: u32,
    /// Appended to the synthesizer's summary instructions.
    pub synthesizer_instructions: String,
    /// Force-accept after this many consecutive rejections. 0 never forces.
    pub max_consecutive_rejections: u32,
    pub unparsed_votes: UnparsedVotePolicy,
}

impl Default for DiscussionConfig {
    fn default() -> Self {
        Self {
            topic_name: String::new(),
            topic_description: String::new(),
            max_iterations: 5,
            exchange_rounds: 1,
            synthesizer_instructions: String::new(),
            max_consecutive_rejections: 5,
            unparsed_votes: UnparsedVotePolicy::default(),
        }
    }
}

impl DiscussionConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidMaxIterations);
        }
        Ok(())
    }
}

/// How far a player's temperature is pushed from its base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Creativity {
    Low,
    #[default]
    Normal,
    High,
}

impl Creativity {
    /// Effective temperature: low subtracts 0.2 with a 0.3 floor, high adds
    /// 0.2 with a 1.0 cap.
    pub fn adjust(self, temperature: f32) -> f32 {
        match self {
            Self::Low => (temperature - 0.2).max(0.3),
            Self::Normal => temperature,
            Self::High => (temperature + 0.2).min(1.0),
        }
    }
}

/// Per-seat settings for a game player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProfile {
    /// Empty means "Network N".
    pub name: String,
    /// Empty means the palette colour for the seat.
    pub color: String,
    pub params: GenerationParams,
    pub creativity: Creativity,
}

/// Mafia game settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub player_count: usize,
    pub mafia_count: usize,
    pub doctor_count: usize,
    pub sheriff_count: usize,
    pub detective_count: usize,
    /// Statement rounds per day. At least 1.
    pub discussion_rounds: u32,
    /// Seed for role shuffling and random fallbacks. Random when unset.
    pub seed: Option<u64>,
    /// Optional per-seat settings; when non-empty there must be one per player.
    pub players: Vec<PlayerProfile>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_count: 6,
            mafia_count: 1,
            doctor_count: 1,
            sheriff_count: 1,
            detective_count: 0,
            discussion_rounds: 1,
            seed: None,
            players: Vec::new(),
        }
    }
}

impl GameConfig {
    pub fn special_role_count(&self) -> usize {
        self.doctor_count + self.sheriff_count + self.detective_count
    }

    /// Check role and player counts. Called before any player exists.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let players = self.player_count;
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&players) {
            return Err(ConfigurationError::PlayerCount(players));
        }
        if self.mafia_count == 0 {
            return Err(ConfigurationError::NoMafia);
        }
        // mafia < players / 2, compared without integer division
        if self.mafia_count * 2 >= players {
            return Err(ConfigurationError::TooManyMafia {
                mafia: self.mafia_count,
                players,
            });
        }
        for (role, count) in [
            ("doctors", self.doctor_count),
            ("sheriffs", self.sheriff_count),
            ("detectives", self.detective_count),
        ] {
            if count > MAX_PER_SPECIAL_ROLE {
                return Err(ConfigurationError::TooManyOfRole {
                    role: role.to_string(),
                    count,
                    max: MAX_PER_SPECIAL_ROLE,
                });
            }
        }
        let assigned = self.mafia_count + self.special_role_count();
        if assigned >= players {
            return Err(ConfigurationError::NoCivilians { assigned, players });
        }
        if self.discussion_rounds == 0 {
            return Err(ConfigurationError::InvalidDiscussionRounds);
        }
        if !self.players.is_empty() && self.players.len() != players {
            return Err(ConfigurationError::PlayerProfiles(self.players.len(), players));
        }
        Ok(())
    }
}
