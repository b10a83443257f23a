//! Session export: JSON, plain-text, and HTML renderings of a transcript.
//!
//! [`SessionExport`] is the format-agnostic snapshot; the renderers below
//! are pure functions over it.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Speaker, Transcript};

/// Errors from writing an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown export format: {0} (expected json, text, or html)")]
    UnknownFormat(String),
}

/// Rendering target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Text,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
            Self::Html => "html",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            "html" => Ok(Self::Html),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// One exported message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMessage {
    pub sender: String,
    pub content: String,
    /// Agent id, `user`, or `system`; doubles as the HTML class.
    pub network: String,
}

/// Snapshot of a session for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub project_name: String,
    pub project_description: String,
    pub accepted_summaries: Vec<String>,
    pub final_output: Option<String>,
    pub messages: Vec<ExportMessage>,
    pub timestamp: DateTime<Utc>,
}

impl SessionExport {
    pub fn new(
        project_name: &str,
        project_description: &str,
        accepted_summaries: Vec<String>,
        final_output: Option<String>,
        transcript: &Transcript,
    ) -> Self {
        let messages = transcript
            .entries()
            .iter()
            .map(|e| ExportMessage {
                sender: e.display_name.clone(),
                content: e.content.clone(),
                network: match &e.speaker {
                    Speaker::Agent(id) => id.clone(),
                    Speaker::User => "user".to_string(),
                    Speaker::System => "system".to_string(),
                },
            })
            .collect();
        Self {
            project_name: project_name.to_string(),
            project_description: project_description.to_string(),
            accepted_summaries,
            final_output,
            messages,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Project: {}\nDescription: {}\n\nDiscussion:\n",
            self.project_name, self.project_description
        );
        let body: Vec<String> = self
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.content))
            .collect();
        out.push_str(&body.join("\n\n"));

        if !self.accepted_summaries.is_empty() {
            out.push_str("\n\nAccepted Summaries:\n");
            for (i, summary) in self.accepted_summaries.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, summary));
            }
        }
        if let Some(final_output) = &self.final_output {
            out.push_str(&format!("\n\nFinal Output:\n{}", final_output));
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
        out.push_str(&format!("<title>{} Discussion</title>\n", escape_html(&self.project_name)));
        out.push_str(
            "<style>\n\
             body { font-family: sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }\n\
             .message { margin-bottom: 20px; padding: 10px; border-radius: 10px; background-color: #f0f9ff; }\n\
             .summarizer { background-color: #fffbeb; }\n\
             .user { background-color: #f0fdf4; }\n\
             .system { background-color: #f9fafb; font-style: italic; }\n\
             .sender { font-weight: bold; margin-bottom: 5px; }\n\
             .final-output { margin-top: 30px; border-top: 1px solid #ddd; padding-top: 20px; }\n\
             </style>\n</head>\n<body>\n",
        );
        out.push_str(&format!("<h1>{}</h1>\n", escape_html(&self.project_name)));
        out.push_str(&format!("<p>{}</p>\n", escape_html(&self.project_description)));
        out.push_str("<h2>Discussion</h2>\n");
        for m in &self.messages {
            out.push_str(&format!(
                "<div class=\"message {}\">\n<div class=\"sender\">{}</div>\n<div class=\"content\">{}</div>\n</div>\n",
                escape_html(&m.network),
                escape_html(&m.sender),
                escape_html(&m.content)
            ));
        }
        if !self.accepted_summaries.is_empty() {
            out.push_str("<h2>Accepted Summaries</h2>\n<ol>\n");
            for summary in &self.accepted_summaries {
                out.push_str(&format!("<li>{}</li>\n", escape_html(summary)));
            }
            out.push_str("</ol>\n");
        }
        if let Some(final_output) = &self.final_output {
            out.push_str(&format!(
                "<div class=\"final-output\">\n<h2>Final Output</h2>\n<pre>{}</pre>\n</div>\n",
                escape_html(final_output)
            ));
        }
        out.push_str("</body>\n</html>\n");
        out
    }

    pub fn render(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Json => self.to_json(),
            ExportFormat::Text => Ok(self.to_text()),
            ExportFormat::Html => Ok(self.to_html()),
        }
    }

    /// `<sanitized project name>_discussion.<ext>`
    pub fn file_name(&self, format: ExportFormat) -> String {
        format!("{}_discussion.{}", sanitize_file_stem(&self.project_name), format.extension())
    }

    /// Render into `dir` and return the written path.
    pub fn write_to(&self, dir: &Path, format: ExportFormat) -> Result<PathBuf, ExportError> {
        let path = dir.join(self.file_name(format));
        std::fs::write(&path, self.render(format)?)?;
        Ok(path)
    }
}

/// Replace every non-alphanumeric ASCII character with `_` and lowercase.
pub fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
