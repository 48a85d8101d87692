//! Turning a question into a command.
//!
//! Model replies are free text. [`normalize_reply`] pulls a command out of
//! one on a best-effort basis: it knows about code fences, comment lines, a
//! fixed list of lead-in phrases, and surrounding quotes, and nothing else.
//! When it finds nothing usable the synthesizer asks once more with a
//! stricter prompt and takes that reply as-is.

use std::sync::Arc;

use crate::config::ModelConfig;
use crate::model::{ModelError, ModelService};

/// Lead-ins models put in front of a command. At most one is stripped.
const FILLER_PREFIXES: &[&str] = &[
    "To check",
    "To see",
    "To find",
    "To get",
    "To list",
    "To show",
    "To display",
    "Running:",
    "Execute:",
    "Command:",
    "Use:",
    "Try:",
    "Run:",
];

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("model service failed: {0}")]
    Model(#[from] ModelError),
    #[error("model did not suggest a command")]
    Empty,
}

/// OS family named in synthesis prompts.
pub fn os_family() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Darwin",
        "windows" => "Windows",
        _ => "Linux",
    }
}

pub struct CommandSynthesizer {
    model: Arc<dyn ModelService>,
    os: String,
    reply_tokens: u32,
    retry_tokens: u32,
}

impl CommandSynthesizer {
    pub fn new(model: Arc<dyn ModelService>, config: &ModelConfig) -> Self {
        Self {
            model,
            os: os_family().to_string(),
            reply_tokens: config.synthesis_tokens,
            retry_tokens: config.retry_tokens,
        }
    }

    /// Name a different OS family in prompts.
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn synthesize(&self, question: &str) -> Result<String, SynthesisError> {
        let prompt = format!(
            "Question: {question}\n\nWhat single {} command answers this? Reply with ONLY the command:",
            self.os
        );
        let reply = self.model.complete(&prompt, self.reply_tokens)?;
        if let Some(command) = normalize_reply(&reply) {
            return Ok(command);
        }

        log::info!("no command in model reply {reply:?}; asking again");
        let strict = format!(
            "What is the exact {} command to: {question}\n\nRespond with ONLY the command, no explanation:",
            self.os
        );
        let reply = self.model.complete(&strict, self.retry_tokens)?;
        let command = strip_quotes(reply.trim());
        if command.is_empty() {
            return Err(SynthesisError::Empty);
        }
        Ok(command.to_string())
    }
}

/// Extract a command from a raw model reply, or `None` if there isn't one.
///
/// Takes the first line that is not blank, a code fence, or a `#` comment,
/// strips one filler prefix and any surrounding quotes or backticks.
pub fn normalize_reply(raw: &str) -> Option<String> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```") && !l.starts_with('#'))?;
    let command = strip_quotes(strip_filler(line));
    if command.is_empty() || command.starts_with("```") {
        return None;
    }
    // Unbalanced quoting counts as no tokens.
    if shlex::split(command).is_none_or(|words| words.is_empty()) {
        return None;
    }
    Some(command.to_string())
}

/// `"To list files: ls -la"` → `"ls -la"`, `"Run: df -h"` → `"df -h"`.
///
/// After a prefix without its own colon, the lead-in runs up to the first
/// word ending in a colon if there is one, otherwise it is a single word.
/// Colons inside a word (`https://`, `+%H:%M`) belong to the command.
fn strip_filler(line: &str) -> &str {
    for prefix in FILLER_PREFIXES {
        let Some(rest) = strip_prefix_ignore_case(line, prefix) else {
            continue;
        };
        if prefix.ends_with(':') {
            return rest.trim_start();
        }
        if !(rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == ':')) {
            // "To seek" is not "To see".
            continue;
        }
        let mut end = 0;
        for piece in rest.split_inclusive(char::is_whitespace) {
            end += piece.len();
            if piece.trim_end().ends_with(':') {
                return rest[end..].trim_start();
            }
        }
        return rest
            .trim_start()
            .split_once(char::is_whitespace)
            .map_or("", |(_, command)| command.trim_start());
    }
    line
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

/// Remove matching pairs of quotes or backticks around the whole text.
fn strip_quotes(mut text: &str) -> &str {
    loop {
        text = text.trim();
        let mut chars = text.chars();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last)) if first == last && matches!(first, '`' | '"' | '\'') => {
                text = &text[1..text.len() - 1];
            }
            _ => return text,
        }
    }
}
