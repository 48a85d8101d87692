use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// Ordered severity of a command: `Safe < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gate does with a command at a given risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    Allow,
    Confirm,
    Block,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Confirm => "confirm",
            Action::Block => "block",
        }
    }
}

/// Maps risk levels to actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub block_at: RiskLevel,
    pub confirm_at: RiskLevel,
    /// Downgrade blocks to confirmation requests.
    pub escalate_block: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl Policy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            block_at: settings.block_at,
            confirm_at: settings.confirm_at,
            escalate_block: settings.escalate_block,
        }
    }

    /// Action for `level`, and whether a block was escalated to a confirmation.
    pub fn apply(&self, level: RiskLevel) -> (Action, bool) {
        if level == RiskLevel::Safe {
            return (Action::Allow, false);
        }
        if level >= self.block_at {
            if self.escalate_block {
                return (Action::Confirm, true);
            }
            return (Action::Block, false);
        }
        if level >= self.confirm_at {
            return (Action::Confirm, false);
        }
        (Action::Allow, false)
    }
}
