//! Day-vote ballots and tallying.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::roles::Player;

/// One elimination vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: String,
    pub target_id: String,
    pub day: u32,
    /// Target replaced by a random valid choice (self-vote or unparsable answer).
    pub random_fallback: bool,
}

/// Result of counting one day's ballots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    /// Votes per target id. Targets with no votes are absent.
    pub counts: BTreeMap<String, usize>,
    /// Set only when one target has strictly more votes than every other.
    pub eliminated: Option<String>,
}

impl VoteTally {
    pub fn votes_for(&self, player_id: &str) -> usize {
        self.counts.get(player_id).copied().unwrap_or(0)
    }

    pub fn is_tie(&self) -> bool {
        self.eliminated.is_none()
    }
}

/// Count ballots cast by living players for living players. A tie at the
/// top, or no counted ballots at all, eliminates nobody.
pub fn tally(players: &[Player], ballots: &[Ballot]) -> VoteTally {
    let alive = |id: &str| players.iter().any(|p| p.id == id && p.alive);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for ballot in ballots {
        if ballot.voter_id == ballot.target_id || !alive(&ballot.voter_id) || !alive(&ballot.target_id) {
            continue;
        }
        *counts.entry(ballot.target_id.clone()).or_default() += 1;
    }

    let top = counts.values().copied().max().unwrap_or(0);
    let mut leaders = counts.iter().filter(|(_, n)| **n == top);
    let eliminated = match (leaders.next(), leaders.next()) {
        (Some((id, _)), None) if top > 0 => Some(id.clone()),
        _ => None,
    };

    VoteTally { counts, eliminated }
}
