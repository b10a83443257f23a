//! Session context: public transcript and per-agent private memory.
//!
//! Both structures are owned by the protocol driver and mutated only after a
//! response has resolved, so neither needs interior locking. The transcript
//! is append-only; it doubles as the audit log of everything said.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{SessionEvent, SharedEventBus};

/// Who produced a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Speaker {
    Agent(String),
    User,
    /// Narration, announcements, and vote logs.
    System,
}

impl Speaker {
    pub fn agent(id: &str) -> Self {
        Self::Agent(id.to_string())
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Agent(id) => Some(id),
            _ => None,
        }
    }
}

/// One public message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Position in the transcript, starting at 0.
    pub seq: u64,
    pub speaker: Speaker,
    pub display_name: String,
    pub content: String,
    /// Whether the content is fallback text standing in for a failed generation.
    pub fallback: bool,
    pub timestamp: DateTime<Utc>,
}

/// Append-only ordered log of public messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, speaker: Speaker, display_name: &str, content: &str, fallback: bool) -> &TranscriptEntry {
        let seq = self.entries.len() as u64;
        self.entries.push(TranscriptEntry {
            seq,
            speaker,
            display_name: display_name.to_string(),
            content: content.to_string(),
            fallback,
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `n` entries.
    pub fn tail(&self, n: usize) -> &[TranscriptEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    /// `Name: content` lines for prompt context.
    pub fn render_lines(entries: &[TranscriptEntry]) -> String {
        entries
            .iter()
            .map(|e| format!("{}: {}", e.display_name, e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A private note held by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNote {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-agent private notes, fed back into that agent's later prompts only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateMemory {
    notes: HashMap<String, Vec<MemoryNote>>,
}

impl PrivateMemory {
    pub fn record(&mut self, agent_id: &str, content: impl Into<String>) {
        self.notes.entry(agent_id.to_string()).or_default().push(MemoryNote {
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn notes(&self, agent_id: &str) -> &[MemoryNote] {
        self.notes.get(agent_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Notes joined one per line, oldest first.
    pub fn recall(&self, agent_id: &str) -> String {
        self.notes(agent_id)
            .iter()
            .map(|n| n.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}

/// Transcript plus private memory for one session, with optional event publishing.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    transcript: Transcript,
    memory: PrivateMemory,
    events: Option<SharedEventBus>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            transcript: Transcript::new(),
            memory: PrivateMemory::default(),
            events: None,
        }
    }

    /// Attach an event bus; every append is published to it.
    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn events(&self) -> Option<&SharedEventBus> {
        self.events.as_ref()
    }

    pub fn publish(&self, event: SessionEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Append a public message and publish it.
    pub fn append(&mut self, speaker: Speaker, display_name: &str, content: &str, fallback: bool) {
        let entry = self.transcript.append(speaker, display_name, content, fallback).clone();
        self.publish(SessionEvent::MessageAppended {
            session_id: self.session_id.clone(),
            seq: entry.seq,
            speaker: entry.speaker,
            display_name: entry.display_name,
            content: entry.content,
            fallback,
            timestamp: entry.timestamp,
        });
    }

    /// Append a narration line.
    pub fn announce(&mut self, content: &str) {
        self.append(Speaker::System, "System", content, false);
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn remember(&mut self, agent_id: &str, note: impl Into<String>) {
        self.memory.record(agent_id, note);
    }

    pub fn memory(&self) -> &PrivateMemory {
        &self.memory
    }

    /// Drop all transcript and memory, keeping the session id and event bus.
    pub fn clear(&mut self) {
        self.transcript = Transcript::new();
        self.memory.clear();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
