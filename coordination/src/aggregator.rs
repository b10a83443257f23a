//! Response aggregation: turns free agent text into decisions.
//!
//! Two shapes are extracted: accept/reject ballots on a candidate summary and
//! 1-based numeric choices from a numbered target list. Both tolerate chatty
//! output; neither ever fails hard. Callers get either a decision or a
//! [`ParseError`] they can recover from with a fallback choice.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

static BARE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*$").expect("bare number regex should compile"));

static CONTEXTUAL_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:number|#|choice|player|target|vote for|eliminate|kill)\s*(?:is|:)?\s*(\d+)")
        .expect("contextual number regex should compile")
});

static ANY_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("any number regex should compile"));

const REJECT_WORDS: &[&str] = &["reject", "rejects", "rejected", "disagree", "disagrees"];
// "t" is the tail of a split contraction: don't, can't, won't.
const NEGATIONS: &[&str] = &["not", "t", "dont", "cant", "cannot", "wont", "never"];

/// Parsed ballot on a candidate summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDecision {
    Accept,
    Reject,
    /// Neither vocabulary matched.
    Unparsed,
}

impl std::fmt::Display for VoteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
            Self::Unparsed => write!(f, "unparsed"),
        }
    }
}

/// How ballots that match neither vocabulary count toward unanimity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparsedVotePolicy {
    /// Unparsed counts as a rejection.
    #[default]
    Reject,
    /// Unparsed ballots are excluded; the rest must still be unanimous and
    /// at least one Accept is required.
    Abstain,
}

/// One agent's ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: String,
    pub raw: String,
    pub decision: VoteDecision,
}

impl Vote {
    pub fn new(agent_id: &str, raw: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            raw: raw.to_string(),
            decision: classify_vote(raw),
        }
    }
}

/// Outcome of a unanimity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub accepted: bool,
    pub accepts: usize,
    pub rejects: usize,
    pub unparsed: usize,
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_accept_word(word: &str) -> bool {
    word.starts_with("accept") || word.starts_with("agree") || word == "yes"
}

/// Classify a ballot into Accept, Reject, or Unparsed.
///
/// An explicit reject word wins over everything. An accept word preceded
/// within two words by a negation ("do not accept", "can't agree") is a
/// rejection.
pub fn classify_vote(text: &str) -> VoteDecision {
    let words = words(text);
    if words.iter().any(|w| REJECT_WORDS.contains(&w.as_str())) {
        return VoteDecision::Reject;
    }

    let mut accepted = false;
    for (i, word) in words.iter().enumerate() {
        if !is_accept_word(word) {
            continue;
        }
        let negated = words[i.saturating_sub(2)..i]
            .iter()
            .any(|w| NEGATIONS.contains(&w.as_str()));
        if negated {
            return VoteDecision::Reject;
        }
        accepted = true;
    }

    if accepted {
        VoteDecision::Accept
    } else {
        VoteDecision::Unparsed
    }
}

/// Two-valued ballot parse: anything not clearly Accept is Reject.
pub fn parse_vote(text: &str) -> VoteDecision {
    match classify_vote(text) {
        VoteDecision::Accept => VoteDecision::Accept,
        _ => VoteDecision::Reject,
    }
}

/// Unanimity rule over a set of ballots.
pub fn evaluate_consensus(votes: &[Vote], policy: UnparsedVotePolicy) -> ConsensusOutcome {
    let accepts = votes.iter().filter(|v| v.decision == VoteDecision::Accept).count();
    let rejects = votes.iter().filter(|v| v.decision == VoteDecision::Reject).count();
    let unparsed = votes.iter().filter(|v| v.decision == VoteDecision::Unparsed).count();

    let accepted = match policy {
        UnparsedVotePolicy::Reject => !votes.is_empty() && accepts == votes.len(),
        UnparsedVotePolicy::Abstain => accepts > 0 && rejects == 0,
    };

    ConsensusOutcome {
        accepted,
        accepts,
        rejects,
        unparsed,
    }
}

/// Extract a number from agent text, in preference order: the whole text is
/// a bare integer, a contextual phrase like "target: 5", then the first
/// integer anywhere. `None` when there are no digits at all; a number too
/// large for `u32` saturates to `u32::MAX`.
pub fn parse_target_number(text: &str) -> Option<u32> {
    let captured = BARE_NUMBER_RE
        .captures(text)
        .or_else(|| CONTEXTUAL_NUMBER_RE.captures(text))
        .and_then(|c| c.get(1))
        .or_else(|| ANY_NUMBER_RE.find(text))?;
    Some(captured.as_str().parse().unwrap_or(u32::MAX))
}

/// Resolve a 1-based choice against a list of `len` options, returning the
/// 0-based index.
pub fn parse_choice(text: &str, len: usize) -> Result<usize, ParseError> {
    let value = parse_target_number(text).ok_or(ParseError::NoNumber)?;
    if value == 0 || value as usize > len {
        return Err(ParseError::OutOfRange { value, max: len });
    }
    Ok(value as usize - 1)
}

/// [`parse_choice`] for a ballot where option `own` is the voter. Naming it
/// is [`ParseError::SelfTarget`].
pub fn parse_choice_excluding(text: &str, len: usize, own: Option<usize>) -> Result<usize, ParseError> {
    let index = parse_choice(text, len)?;
    if Some(index) == own {
        return Err(ParseError::SelfTarget);
    }
    Ok(index)
}
