//! The text-generation service behind synthesis and composition.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use crate::config::ModelConfig;
use crate::risk::paths;

/// Text in, text out. Implementations block until the reply is complete.
pub trait ModelService: Send + Sync {
    fn complete(&self, prompt: &str, max_reply_tokens: u32) -> Result<String, ModelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no model program configured (set model.program)")]
    Unconfigured,
    #[error("failed to start model program {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("model program exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
    #[error("i/o error talking to model program: {0}")]
    Io(#[from] io::Error),
}

/// Runs an external program per request: the prompt goes to its stdin and
/// its stdout is the reply.
///
/// The program also sees `ASKGATE_MAX_TOKENS` and `ASKGATE_SYSTEM_PROMPT`.
#[derive(Debug, Clone)]
pub struct ExternalModel {
    program: String,
    args: Vec<String>,
    system_prompt: String,
}

impl ExternalModel {
    pub fn new(config: &ModelConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            program: config.program.trim().to_string(),
            args: config.args.clone(),
            system_prompt: system_prompt.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.program.is_empty()
    }
}

impl ModelService for ExternalModel {
    fn complete(&self, prompt: &str, max_reply_tokens: u32) -> Result<String, ModelError> {
        if !self.is_configured() {
            return Err(ModelError::Unconfigured);
        }
        let program = paths::expand(&self.program);
        log::debug!("model request ({max_reply_tokens} tokens) via {program}");

        let mut child = Command::new(&program)
            .args(&self.args)
            .env("ASKGATE_MAX_TOKENS", max_reply_tokens.to_string())
            .env("ASKGATE_SYSTEM_PROMPT", &self.system_prompt)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ModelError::Spawn {
                program: program.clone(),
                source,
            })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&prompt))
        });
        let output = child.wait_with_output()?;
        if let Some(Ok(Err(e))) = writer.map(thread::JoinHandle::join) {
            // A program that replies without reading its input is fine.
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        if !output.status.success() {
            return Err(ModelError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
