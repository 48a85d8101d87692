//! Named operations a transport can call with JSON arguments.
//!
//! Requests look like `{"tool": "execute_command", "arguments": {"command": "ls"}}`;
//! the reply is the operation's result serialized as JSON.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::pipeline::QuestionPipeline;

type Handler = fn(&QuestionPipeline, &Value) -> Result<Value, ToolError>;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    handler: Handler,
}

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "execute_command",
        description: "Run a shell command through the safety gate. Arguments: command, cwd?, force?",
        handler: execute_command,
    },
    ToolSpec {
        name: "answer_question",
        description: "Answer a natural-language question by running a command. Arguments: question, cwd?",
        handler: answer_question,
    },
    ToolSpec {
        name: "validate_command",
        description: "Classify a shell command without running it. Arguments: command, cwd?",
        handler: validate_command,
    },
];

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("bad arguments for {tool}: {source}")]
    BadArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed request: {0}")]
    BadRequest(#[source] serde_json::Error),
    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct QuestionArgs {
    question: String,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

pub fn dispatch(pipeline: &QuestionPipeline, name: &str, arguments: &Value) -> Result<Value, ToolError> {
    let tool = find(name).ok_or_else(|| ToolError::Unknown(name.to_string()))?;
    (tool.handler)(pipeline, arguments)
}

/// Handle one raw JSON request. Errors are reported as `{"error": "..."}`.
pub fn handle_request(pipeline: &QuestionPipeline, input: &str) -> Value {
    let outcome = serde_json::from_str::<ToolRequest>(input)
        .map_err(ToolError::BadRequest)
        .and_then(|req| dispatch(pipeline, &req.tool, &req.arguments));
    outcome.unwrap_or_else(|e| {
        log::warn!("{e}");
        json!({ "error": e.to_string() })
    })
}

fn parse<'a, T: Deserialize<'a>>(tool: &'static str, arguments: &'a Value) -> Result<T, ToolError> {
    T::deserialize(arguments).map_err(|source| ToolError::BadArguments { tool, source })
}

fn encode(value: impl serde::Serialize) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(ToolError::Encode)
}

fn execute_command(pipeline: &QuestionPipeline, arguments: &Value) -> Result<Value, ToolError> {
    let args: CommandArgs = parse("execute_command", arguments)?;
    encode(pipeline.execute_command(&args.command, args.cwd.as_deref(), args.force))
}

fn answer_question(pipeline: &QuestionPipeline, arguments: &Value) -> Result<Value, ToolError> {
    let args: QuestionArgs = parse("answer_question", arguments)?;
    encode(pipeline.answer_question(&args.question, args.cwd.as_deref()))
}

fn validate_command(pipeline: &QuestionPipeline, arguments: &Value) -> Result<Value, ToolError> {
    let args: CommandArgs = parse("validate_command", arguments)?;
    encode(pipeline.validate_command(&args.command, args.cwd.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        for (i, tool) in TOOLS.iter().enumerate() {
            assert!(TOOLS[i + 1..].iter().all(|t| t.name != tool.name), "{}", tool.name);
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn lookup() {
        assert!(find("answer_question").is_some());
        assert!(find("rm").is_none());
    }
}
