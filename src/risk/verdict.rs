use serde::{Deserialize, Serialize};

use crate::rules::Category;

use super::context::CommandContext;
use super::level::{Action, RiskLevel};

/// The classifier's answer for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub risk_level: RiskLevel,
    /// False iff the command must not run.
    pub allowed: bool,
    /// Allowed, but only after an explicit override.
    pub requires_confirmation: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Verdict {
    pub fn safe() -> Self {
        Self {
            risk_level: RiskLevel::Safe,
            allowed: true,
            requires_confirmation: false,
            reason: "no risky patterns detected".into(),
            blocked_reason: None,
            warnings: Vec::new(),
        }
    }

    /// What the gate does with this verdict.
    pub fn action(&self) -> Action {
        if !self.allowed {
            Action::Block
        } else if self.requires_confirmation {
            Action::Confirm
        } else {
            Action::Allow
        }
    }

    pub fn empty_command() -> Self {
        Self {
            reason: "empty command".into(),
            warnings: vec!["empty command: nothing will be executed".into()],
            ..Self::safe()
        }
    }
}

/// What a single rule reports when it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub level: RiskLevel,
    pub reason: String,
    pub warnings: Vec<String>,
}

impl RuleHit {
    pub fn new(level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A rule hit together with where it came from and what the policy makes of it.
#[derive(Debug, Clone)]
pub struct Finding {
    pub category: Category,
    pub level: RiskLevel,
    pub action: Action,
    pub reason: String,
    pub warnings: Vec<String>,
    /// The command segment that matched. `None` for whole-script patterns.
    pub context: Option<CommandContext>,
}

/// A verdict plus the findings behind it, for callers that need details
/// (alternatives, backup advice).
#[derive(Debug, Clone)]
pub struct Assessment {
    pub verdict: Verdict,
    pub findings: Vec<Finding>,
}

