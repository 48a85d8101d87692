//! askgate: answers shell questions through a command-safety gate.
//!
//! A question is turned into a shell command by an external model, the
//! command is classified for risk, and depending on the verdict it is run,
//! paused pending an explicit override, or refused with safer alternatives.
//! The output is then handed back to the model to phrase an answer.
//!
//! Commands are parsed with tree-sitter-bash, so a dangerous command hidden
//! in a chain, pipeline, substitution or `sh -c` script is still found.
//!
//! # Architecture
//!
//! - **[`parse`]**: tree-sitter segment extraction, shlex tokenizer, segment types.
//! - **[`risk`]**: the classifier, risk levels and policy, verdicts, path resolution.
//! - **[`rules`]**: the ordered catalog of risk categories.
//! - **[`advice`]**: safer alternatives and backup steps for risky commands.
//! - **[`gate`]**: classify, then block, pause, or run.
//! - **[`exec`]**: shell execution with a timeout and output cap.
//! - **[`model`]**, **[`prompt`]**: the text-generation service and its system prompt.
//! - **[`synth`]**, **[`compose`]**: question to command, output to answer.
//! - **[`memory`]**: bounded, persisted interaction history.
//! - **[`pipeline`]**: the end-to-end question answering entry point.
//! - **[`tools`]**: named JSON operations for a transport layer.
//! - **[`config`]**: embedded defaults plus user overlay.
//! - **[`logging`]**: logger setup and decision audit lines.

/// Safer rewrites and backup recommendations.
pub mod advice;
/// Output-to-answer composition.
pub mod compose;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Shell command execution.
pub mod exec;
/// The safety gate and execution results.
pub mod gate;
/// Logger initialisation and decision logging.
pub mod logging;
/// Interaction history and its stores.
pub mod memory;
/// Model service trait and the external-program adapter.
pub mod model;
/// Shell command parsing: tree-sitter AST, shlex tokenizer, segment types.
pub mod parse;
/// Question answering pipeline.
pub mod pipeline;
/// System prompt loading.
pub mod prompt;
/// Risk classification.
pub mod risk;
/// Risk rule catalog.
pub mod rules;
/// Question-to-command synthesis.
pub mod synth;
/// Static tool dispatch table.
pub mod tools;

use std::path::Path;

use risk::Verdict;

/// Classify a command with the default configuration.
///
/// This is the main entry point for tests and simple usage.
/// For user config or policy overrides, build a [`risk::RiskClassifier`] directly.
pub fn classify(command: &str, cwd: Option<&Path>) -> Verdict {
    let config = config::Config::default_config();
    risk::RiskClassifier::from_config(&config).classify(command, cwd)
}
