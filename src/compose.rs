use std::sync::Arc;

use crate::config::ModelConfig;
use crate::model::{ModelError, ModelService};

/// Asks the model to describe a command's output as an answer to the question.
pub struct AnswerComposer {
    model: Arc<dyn ModelService>,
    reply_tokens: u32,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn ModelService>, config: &ModelConfig) -> Self {
        Self {
            model,
            reply_tokens: config.answer_tokens,
        }
    }

    /// The trimmed reply, verbatim. Model failures are returned, never papered over.
    pub fn compose(
        &self,
        question: &str,
        command: &str,
        stdout: &str,
        stderr: &str,
    ) -> Result<String, ModelError> {
        let prompt = format!(
            "Question: {question}\nCommand: {command}\nOutput: {stdout}\nError: {stderr}\n\nAnswer in plain English:"
        );
        Ok(self.model.complete(&prompt, self.reply_tokens)?.trim().to_string())
    }
}
