//! The safety gate: classify, then block, pause, or run.
//!
//! Every call ends in exactly one of three outcomes, reflected in
//! [`ExecutionResult`]:
//!
//! - **blocked**: not run, `exit_code` -1, `stderr` carries the blocked reason
//!   and `alternatives` any safer rewrites.
//! - **paused**: not run, `exit_code` -2, pending a forced re-run; `backup`
//!   carries a backup step when one applies.
//! - **completed**: run, with its real exit code. A command that could not be
//!   run at all (spawn failure, timeout) also lands here with `exit_code` -1.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::advice;
use crate::config::Config;
use crate::exec::{CommandRunner, ExecError, RawOutput};
use crate::logging;
use crate::memory::{InteractionKind, InteractionMemory, InteractionRecord};
use crate::risk::{RiskClassifier, RiskLevel, Verdict};

/// Exit code for a blocked command or one that failed to run.
pub const EXIT_BLOCKED: i32 = -1;
/// Exit code for a command waiting on confirmation.
pub const EXIT_PAUSED: i32 = -2;

pub const PAUSED_MESSAGE: &str = "execution paused pending confirmation";
pub const SAFE_MODE_OFF_WARNING: &str = "safe mode is off: risky command ran without a check";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub succeeded: bool,
    pub blocked: bool,
    pub requires_confirmation: bool,
    /// Absent when the command was forced past classification.
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    fn blocked(command: &str, verdict: &Verdict, alternatives: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            stdout: String::new(),
            stderr: verdict
                .blocked_reason
                .clone()
                .unwrap_or_else(|| verdict.reason.clone()),
            exit_code: EXIT_BLOCKED,
            succeeded: false,
            blocked: true,
            requires_confirmation: false,
            risk_level: Some(verdict.risk_level),
            alternatives,
            backup: None,
            warnings: verdict.warnings.clone(),
        }
    }

    fn paused(command: &str, verdict: &Verdict, backup: Option<String>) -> Self {
        Self {
            command: command.to_string(),
            stdout: String::new(),
            stderr: PAUSED_MESSAGE.to_string(),
            exit_code: EXIT_PAUSED,
            succeeded: false,
            blocked: false,
            requires_confirmation: true,
            risk_level: Some(verdict.risk_level),
            alternatives: Vec::new(),
            backup,
            warnings: verdict.warnings.clone(),
        }
    }

    fn completed(
        command: &str,
        output: RawOutput,
        risk_level: Option<RiskLevel>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            command: command.to_string(),
            succeeded: output.exit_code == 0,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            blocked: false,
            requires_confirmation: false,
            risk_level,
            alternatives: Vec::new(),
            backup: None,
            warnings,
        }
    }

    fn fault(
        command: &str,
        error: &ExecError,
        risk_level: Option<RiskLevel>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            command: command.to_string(),
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: EXIT_BLOCKED,
            succeeded: false,
            blocked: false,
            requires_confirmation: false,
            risk_level,
            alternatives: Vec::new(),
            backup: None,
            warnings,
        }
    }

    /// Whether the command actually ran (to completion or not).
    pub fn ran(&self) -> bool {
        !self.blocked && !self.requires_confirmation
    }

    /// Short text for history: stdout, or stderr when there is none.
    fn summary(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

pub struct SafetyGate {
    classifier: RiskClassifier,
    runner: Box<dyn CommandRunner>,
    memory: Arc<InteractionMemory>,
    safe_mode: bool,
    summary_chars: usize,
}

impl SafetyGate {
    pub fn new(
        classifier: RiskClassifier,
        runner: Box<dyn CommandRunner>,
        memory: Arc<InteractionMemory>,
    ) -> Self {
        Self {
            classifier,
            runner,
            memory,
            safe_mode: true,
            summary_chars: 200,
        }
    }

    pub fn from_config(
        config: &Config,
        runner: Box<dyn CommandRunner>,
        memory: Arc<InteractionMemory>,
    ) -> Self {
        let mut gate = Self::new(RiskClassifier::from_config(config), runner, memory);
        gate.safe_mode = config.settings.safe_mode;
        gate.summary_chars = config.history.summary_chars;
        gate
    }

    pub fn set_safe_mode(&mut self, on: bool) {
        self.safe_mode = on;
    }

    pub fn validate(&self, command: &str, cwd: Option<&Path>) -> Verdict {
        self.classifier.classify(command, cwd)
    }

    /// Run `command` if its verdict allows it, or unconditionally with `force`.
    /// Never fails: every outcome is described by the result.
    pub fn execute(&self, command: &str, cwd: Option<&Path>, force: bool) -> ExecutionResult {
        let result = if force {
            log::warn!("running without a safety check: {command}");
            self.run(command, cwd, None, Vec::new())
        } else {
            self.checked(command, cwd)
        };
        self.memory.append(InteractionRecord::new(
            InteractionKind::Command,
            command,
            result.summary(),
            result.succeeded,
            self.summary_chars,
        ));
        result
    }

    fn checked(&self, command: &str, cwd: Option<&Path>) -> ExecutionResult {
        let assessment = self.classifier.assess(command, cwd);
        let verdict = &assessment.verdict;
        logging::log_decision(command, verdict);
        report(verdict);

        if !self.safe_mode {
            let mut warnings = verdict.warnings.clone();
            if !verdict.allowed || verdict.requires_confirmation {
                warnings.push(SAFE_MODE_OFF_WARNING.to_string());
            }
            return self.run(command, cwd, Some(verdict.risk_level), warnings);
        }
        if !verdict.allowed {
            let alternatives = advice::alternatives::for_findings(&assessment.findings);
            for alt in &alternatives {
                log::info!("safer alternative: {alt}");
            }
            return ExecutionResult::blocked(command, verdict, alternatives);
        }
        if verdict.requires_confirmation {
            let backup = advice::backup::for_findings(&assessment.findings);
            if let Some(step) = &backup {
                log::info!("{step}");
            }
            return ExecutionResult::paused(command, verdict, backup);
        }
        self.run(command, cwd, Some(verdict.risk_level), verdict.warnings.clone())
    }

    fn run(
        &self,
        command: &str,
        cwd: Option<&Path>,
        risk_level: Option<RiskLevel>,
        warnings: Vec<String>,
    ) -> ExecutionResult {
        log::debug!("executing: {command}");
        match self.runner.run(command, cwd) {
            Ok(output) => ExecutionResult::completed(command, output, risk_level, warnings),
            Err(e) => {
                log::warn!("execution failed: {e}");
                ExecutionResult::fault(command, &e, risk_level, warnings)
            }
        }
    }
}

fn report(verdict: &Verdict) {
    if verdict.risk_level == RiskLevel::Safe {
        return;
    }
    log::info!("{} risk: {}", verdict.risk_level.label(), verdict.reason);
    for warning in &verdict.warnings {
        log::info!("warning: {warning}");
    }
}
