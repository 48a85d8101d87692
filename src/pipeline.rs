//! Question in, answer out.
//!
//! [`QuestionPipeline::answer_question`] synthesizes a command, runs it
//! through the [`SafetyGate`], has the model describe the output, and records
//! the exchange. Nothing here returns an error: failures end up as an
//! [`AnswerResult`] with `succeeded == false` and an apology as the answer.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::compose::AnswerComposer;
use crate::gate::{ExecutionResult, SafetyGate};
use crate::memory::{InteractionKind, InteractionMemory, InteractionRecord};
use crate::model::ModelError;
use crate::risk::Verdict;
use crate::synth::{CommandSynthesizer, SynthesisError};

/// `command_used` when no command could be synthesized.
pub const UNKNOWN_COMMAND: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("could not describe the output: {0}")]
    Composition(#[from] ModelError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub question: String,
    pub command_used: String,
    pub answer: String,
    /// Absent when synthesis failed and nothing was attempted.
    pub raw_output: Option<ExecutionResult>,
    pub succeeded: bool,
}

impl AnswerResult {
    fn apology(question: &str, command: &str, error: &PipelineError, raw_output: Option<ExecutionResult>) -> Self {
        Self {
            question: question.to_string(),
            command_used: command.to_string(),
            answer: format!("Sorry, I couldn't process your question: {error}"),
            raw_output,
            succeeded: false,
        }
    }
}

pub struct QuestionPipeline {
    synthesizer: CommandSynthesizer,
    gate: SafetyGate,
    composer: AnswerComposer,
    memory: Arc<InteractionMemory>,
    summary_chars: usize,
}

impl QuestionPipeline {
    pub fn new(
        synthesizer: CommandSynthesizer,
        gate: SafetyGate,
        composer: AnswerComposer,
        memory: Arc<InteractionMemory>,
        summary_chars: usize,
    ) -> Self {
        Self {
            synthesizer,
            gate,
            composer,
            memory,
            summary_chars,
        }
    }

    pub fn answer_question(&self, question: &str, cwd: Option<&Path>) -> AnswerResult {
        let result = self.answer(question, cwd);
        self.memory.append(InteractionRecord::new(
            InteractionKind::Question,
            question,
            &result.answer,
            result.succeeded,
            self.summary_chars,
        ));
        result
    }

    pub fn execute_command(&self, command: &str, cwd: Option<&Path>, force: bool) -> ExecutionResult {
        self.gate.execute(command, cwd, force)
    }

    pub fn validate_command(&self, command: &str, cwd: Option<&Path>) -> Verdict {
        self.gate.validate(command, cwd)
    }

    fn answer(&self, question: &str, cwd: Option<&Path>) -> AnswerResult {
        let command = match self.synthesizer.synthesize(question) {
            Ok(command) => command,
            Err(e) => {
                let error = PipelineError::from(e);
                log::warn!("{error}");
                return AnswerResult::apology(question, UNKNOWN_COMMAND, &error, None);
            }
        };
        log::info!("answering {question:?} with: {command}");

        let output = self.gate.execute(&command, cwd, false);
        if !output.ran() {
            let local = not_run(&command, &output);
            let answer = match self.composer.compose(question, &command, &output.stdout, &local) {
                Ok(answer) if !answer.is_empty() => answer,
                Ok(_) => local,
                Err(e) => {
                    log::warn!("{}", PipelineError::from(e));
                    local
                }
            };
            return AnswerResult {
                question: question.to_string(),
                command_used: command,
                answer,
                raw_output: Some(output),
                succeeded: false,
            };
        }

        match self
            .composer
            .compose(question, &command, &output.stdout, &output.stderr)
        {
            Ok(answer) => AnswerResult {
                question: question.to_string(),
                command_used: command,
                answer,
                succeeded: output.succeeded,
                raw_output: Some(output),
            },
            Err(e) => {
                let error = PipelineError::from(e);
                log::warn!("{error}");
                AnswerResult::apology(question, &command, &error, Some(output))
            }
        }
    }
}

/// What the gate did with a command it stopped. Handed to the model as the
/// command's error output, and used as the answer if the model has nothing.
fn not_run(command: &str, output: &ExecutionResult) -> String {
    let mut answer = if output.blocked {
        format!("I did not run `{command}` because it was blocked: {}.", output.stderr)
    } else {
        let level = output.risk_level.unwrap_or_default();
        format!("I did not run `{command}` because it needs confirmation ({level} risk). Run it again with force to proceed.")
    };
    if !output.alternatives.is_empty() {
        answer.push_str(&format!(" Safer alternatives: {}", output.alternatives.join("; ")));
    }
    if let Some(backup) = &output.backup {
        answer.push_str(&format!(" {backup}"));
    }
    answer
}
