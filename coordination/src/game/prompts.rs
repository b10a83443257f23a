//! Prompt construction for the Mafia game.

use crate::registry::UNRESTRICTED_PREAMBLE;
use crate::session::{Transcript, TranscriptEntry};

use super::night::NightInstruction;
use super::roles::{Player, Role};

const PLAYER_SYSTEM: &str = "You are playing a character in a Mafia game. Respond as your \
character would, based on the game information. Keep your role secret if you are a mafia member. \
Never directly state your role. Give thoughtful and meaningful responses, avoiding generic answers.";

/// Transcript entries shown in day and vote prompts.
pub const DAY_CONTEXT_ENTRIES: usize = 40;

/// Game-wide view shared by every prompt of one phase.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    pub day: u32,
    pub players: &'a [Player],
    pub transcript: &'a Transcript,
}

impl Table<'_> {
    fn alive_names(&self) -> String {
        self.players
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn eliminated(&self) -> Option<String> {
        let dead: Vec<String> = self
            .players
            .iter()
            .filter(|p| !p.alive)
            .map(|p| format!("{} ({})", p.name, p.role))
            .collect();
        (!dead.is_empty()).then(|| dead.join(", "))
    }

    fn fellow_mafia(&self, player: &Player) -> Vec<&str> {
        self.players
            .iter()
            .filter(|p| p.alive && p.role.is_mafia() && p.id != player.id)
            .map(|p| p.name.as_str())
            .collect()
    }

    fn header(&self, player: &Player, phase_line: &str) -> String {
        let mut prompt = format!("You are playing as {} in a Mafia game.\n\n{}\n\n", player.name, phase_line);
        prompt.push_str(&format!("Alive players: {}.\n\n", self.alive_names()));
        if let Some(dead) = self.eliminated() {
            prompt.push_str(&format!("Eliminated players: {}.\n\n", dead));
        }
        prompt
    }

    fn recent_log(&self) -> String {
        let entries: &[TranscriptEntry] = self.transcript.tail(DAY_CONTEXT_ENTRIES);
        entries
            .iter()
            .map(|e| format!("- {}: {}\n", e.display_name, e.content))
            .collect()
    }
}

/// System prompt for a player, honouring their override.
pub fn player_system_prompt(player: &Player, unrestricted_mode: bool) -> String {
    let base = match &player.params.system_prompt_override {
        Some(custom) if !custom.trim().is_empty() => custom.clone(),
        _ => PLAYER_SYSTEM.to_string(),
    };
    if unrestricted_mode {
        format!("{}\n\n{}", UNRESTRICTED_PREAMBLE, base)
    } else {
        base
    }
}

fn with_memory(mut prompt: String, memory: &str) -> String {
    if !memory.is_empty() {
        prompt.push_str("\n\nYour previous thoughts (private to you):\n");
        prompt.push_str(memory);
    }
    prompt
}

/// Night-action prompt for a role holder. `voted_against` holds the names
/// of players who previously voted to eliminate this player.
pub fn night_prompt(
    table: &Table<'_>,
    player: &Player,
    instruction: &NightInstruction,
    voted_against: &[String],
    memory: &str,
) -> String {
    let mut prompt = table.header(player, &format!("It is Night {}.", table.day));

    let (role_line, task) = match instruction.role {
        Role::Mafia => (
            "YOU ARE MAFIA. Your goal is to eliminate civilians without revealing your identity.",
            "You must choose ONE player to kill tonight. It's recommended to kill those who suspect the mafia or voted against you.",
        ),
        Role::Doctor => (
            "YOU ARE THE DOCTOR. Each night you may protect one player from a mafia attack, yourself included.",
            "You must choose ONE player to protect tonight.",
        ),
        Role::Sheriff => (
            "YOU ARE THE SHERIFF. Each night you may investigate one player to learn whether they are mafia.",
            "You must choose ONE player to investigate tonight.",
        ),
        Role::Detective => (
            "YOU ARE THE DETECTIVE. Each night you may track one player to see who they visit.",
            "You must choose ONE player to track tonight.",
        ),
        Role::Civilian => ("YOU ARE A CIVILIAN.", "You sleep through the night."),
    };
    prompt.push_str(role_line);
    prompt.push_str("\n\n");

    if instruction.role.is_mafia() {
        if instruction.fellow_mafia.is_empty() {
            prompt.push_str("You are the only mafia member left.\n\n");
        } else {
            prompt.push_str(&format!(
                "Your fellow mafia members are: {}.\n\n",
                instruction.fellow_mafia.join(", ")
            ));
        }
    }

    prompt.push_str(task);
    prompt.push_str(" Your available targets are:\n");
    for (i, target) in instruction.targets.iter().enumerate() {
        prompt.push_str(&format!("{}. {}", i + 1, target.name));
        if voted_against.contains(&target.name) {
            prompt.push_str(" (Voted against you)");
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRespond with ONLY the NUMBER of the player you choose. Also briefly explain (to yourself) the reason for your choice.",
    );

    with_memory(prompt, memory)
}

/// Stricter follow-up after an invalid target answer.
pub fn strict_retry_prompt(original: &str, options: usize) -> String {
    format!(
        "{}\n\nYour previous response was invalid. You MUST respond with ONLY a number between 1 and {} \
         representing your target. Please try again.",
        original, options
    )
}

fn allegiance_line(table: &Table<'_>, player: &Player) -> String {
    if player.role.is_mafia() {
        let mut line =
            "YOU ARE MAFIA. Vote strategically to protect yourself and other mafia members.".to_string();
        let fellows = table.fellow_mafia(player);
        if !fellows.is_empty() {
            line.push_str(&format!(
                "\nDo not vote for your fellow mafia members: {}.",
                fellows.join(", ")
            ));
        }
        line
    } else {
        "YOU ARE A CIVILIAN. Vote for who you think is most likely to be mafia based on the discussion."
            .to_string()
    }
}

/// Public statement prompt for one day-discussion round. `heard` holds
/// `(name, statement)` pairs from earlier rounds of the same day that are
/// not in the transcript yet.
pub fn day_prompt(
    table: &Table<'_>,
    player: &Player,
    round: u32,
    total_rounds: u32,
    heard: &[(String, String)],
    memory: &str,
) -> String {
    let mut prompt = table.header(
        player,
        &format!(
            "It is Day {}, discussion round {} of {}.",
            table.day, round, total_rounds
        ),
    );
    prompt.push_str(&allegiance_line(table, player));
    prompt.push_str("\n\nHere's a summary of today's discussion:\n");
    prompt.push_str(&table.recent_log());
    for (name, statement) in heard {
        prompt.push_str(&format!("- {}: {}\n", name, statement));
    }
    prompt.push_str(
        "\nYou need to express your thoughts about who might be mafia.\n\
         IMPORTANT: DO NOT DIRECTLY STATE YOUR ROLE. Do not say \"I am a civilian\" or \"I am mafia\". \
         Keep your role secret.\n\
         Write a brief message (2-3 sentences) to share with the town. Focus on your suspicions or defense. \
         YOU MUST express a specific opinion, do not respond with generic phrases.",
    );
    with_memory(prompt, memory)
}

/// Elimination-vote prompt. `candidates` are every alive player numbered
/// 1..; the voter's own line is left out but the numbering is kept.
pub fn vote_prompt(table: &Table<'_>, player: &Player, candidates: &[&Player], memory: &str) -> String {
    let mut prompt = table.header(player, &format!("It is the Voting Phase of Day {}.", table.day));
    prompt.push_str(&allegiance_line(table, player));
    prompt.push_str("\n\nHere's a summary of today's discussion:\n");
    prompt.push_str(&table.recent_log());
    prompt.push_str("\nYou must vote for ONE player to eliminate. Your voting options are:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.id != player.id {
            prompt.push_str(&format!("{}. {}\n", i + 1, candidate.name));
        }
    }
    prompt.push_str("Respond with ONLY the NUMBER of the player you want to vote to eliminate. Do not explain your choice.");
    with_memory(prompt, memory)
}
